use a68_lang::{Builtin, SyntaxTree, TreeBuilder};
use assert_cmd::cargo;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;

fn formula_tree() -> SyntaxTree {
    let mut b = TreeBuilder::new();
    b.open_scope();
    let int = b.modes().standard().int;
    let (_, a) = b.variable_declaration("a", int, None);
    let ai = b.identifier(a);
    let value = b.dereference(ai);
    let one = b.denotation("1", int);
    let sum = b.formula(value, Builtin::IntAdd, one);
    b.finish(sum)
}

fn overflowing_tree() -> SyntaxTree {
    let mut b = TreeBuilder::new();
    let real = b.modes().standard().real;
    let max = b.standard(Builtin::MaxReal);
    let big = b.denotation("1e300", real);
    let product = b.formula(max, Builtin::RealMul, big);
    b.finish(product)
}

fn write_tree(dir: &tempfile::TempDir, tree: &SyntaxTree) -> PathBuf {
    let path = dir.path().join("tree.json");
    fs::write(&path, a68_lang::tree_to_json(tree).unwrap()).unwrap();
    path
}

#[test]
fn test_cli_compiles_tree_from_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let json = a68_lang::tree_to_json(&formula_tree())?;
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    let assert = cmd.write_stdin(json).assert();
    let output = assert.success().code(0).get_output().stdout.clone();
    let source = String::from_utf8(output)?;
    assert!(source.starts_with("#include <a68g-config.h>"));
    assert!(source.contains("A68_PUSH_VALUE (p, (V (a_obj_"));

    Ok(())
}

#[rstest]
#[case::nothing(vec!["-O", "0"], false)]
#[case::units(vec!["-O", "1"], true)]
#[case::checked(vec!["-O", "3", "--checked"], true)]
fn test_cli_writes_output_file(#[case] args: Vec<&str>, #[case] has_function: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_tree(&dir, &formula_tree());
    let output = dir.path().join("out.c");
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    cmd.args(&args).arg(&input).arg("-o").arg(&output).assert().success().stdout("");
    let source = fs::read_to_string(&output)?;
    assert_eq!(source.contains("A68_PROP_T _formula_int_"), has_function);

    Ok(())
}

#[test]
fn test_cli_reports_diagnostics_without_failing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_tree(&dir, &overflowing_tree());
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    let assert = cmd.arg(&input).assert().success();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("does not evaluate to a finite value"));
    assert!(stderr.contains("0 functions generated, 1 diagnostics"));

    Ok(())
}

#[test]
fn test_cli_writes_annotated_tree() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_tree(&dir, &formula_tree());
    let annotated = dir.path().join("annotated.json");
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    cmd.arg(&input).arg("--annotated").arg(&annotated).assert().success();
    let tree = a68_lang::tree_from_json(&fs::read_to_string(&annotated)?)?;
    let root = tree.root.ok_or("missing root")?;
    assert!(!tree.annotation(root).is_pending());

    Ok(())
}

#[rstest]
#[case::not_json("this is not a tree")]
#[case::wrong_shape("{\"nodes\": 3}")]
fn test_cli_rejects_invalid_input(#[case] input: &str) {
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    cmd.write_stdin(input).assert().failure();
}

#[test]
fn test_cli_rejects_missing_file() {
    let mut cmd = cargo::cargo_bin_cmd!("a68c");

    cmd.arg("/nonexistent/tree.json").assert().failure();
}
