use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use blossom_ast::builder::*;
use blossom_ast::{Decl, MatchArm, Unit};

fn temp_dir(tag: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("blossom-cli-{tag}-{}-{ts}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    // Pin config discovery to this directory.
    std::fs::write(dir.join("blossom.toml"), "[check]\njobs = 2\n").expect("write config");
    dir
}

fn shapes(arms: Vec<MatchArm>) -> Unit {
    unit(
        "shapes",
        vec![
            variant(
                "Shape",
                vec![
                    ("Circle", vec![real()]),
                    ("Square", vec![real()]),
                    ("Triangle", vec![real(), real(), real()]),
                ],
            ),
            Decl::Function(function(
                "area",
                vec![("s", named("Shape"))],
                vec![match_(place("s"), named("Shape"), arms)],
            )),
        ],
    )
}

fn partial() -> Unit {
    shapes(vec![
        arm(ctor("Circle", vec![bind("r")]), vec![]),
        arm(ctor("Square", vec![wild()]), vec![]),
    ])
}

fn complete() -> Unit {
    shapes(vec![
        arm(ctor("Circle", vec![bind("r")]), vec![]),
        arm(wild(), vec![]),
    ])
}

fn write_unit(dir: &Path, unit: &Unit) -> String {
    let path = dir.join(format!("{}.json", unit.name));
    std::fs::write(&path, serde_json::to_string(unit).expect("serialize unit")).expect("write unit");
    path.to_str().expect("temp path must be UTF-8").to_string()
}

fn blossom(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blossom"))
        .args(args)
        .env_remove("BLOSSOM_LOG")
        .output()
        .expect("spawn blossom")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn clean_unit_passes() {
    let dir = temp_dir("clean");
    let path = write_unit(&dir, &complete());
    let out = blossom(&["check", &path]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("1 function(s) checked"), "{text}");
    assert!(text.contains("0 error(s)"), "{text}");
}

#[test]
fn missing_constructor_fails_with_a_witness() {
    let dir = temp_dir("partial");
    let path = write_unit(&dir, &partial());
    let out = blossom(&["check", &path, "--format", "json", "--no-cache"]);
    assert!(!out.status.success());

    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json report");
    assert_eq!(json["ok"], false);
    let d = &json["diagnostics"][0];
    assert_eq!(d["kind"], "NonExhaustiveMatch");
    assert_eq!(d["function"], "area");
    assert_eq!(d["witnesses"][0], "Triangle(_, _, _)");
    assert!(!dir.join(".blossom-cache.json").exists());
}

#[test]
fn second_run_is_served_from_the_cache() {
    let dir = temp_dir("cache");
    let path = write_unit(&dir, &partial());

    let first = blossom(&["check", &path, "--format", "json"]);
    let first: serde_json::Value = serde_json::from_str(&stdout(&first)).expect("json report");
    assert_eq!(first["cache_hits"], 0);
    assert!(dir.join(".blossom-cache.json").exists());

    let second = blossom(&["check", &path, "--format", "json"]);
    let second: serde_json::Value = serde_json::from_str(&stdout(&second)).expect("json report");
    assert_eq!(second["cache_hits"], 1);
    assert_eq!(second["diagnostics"], first["diagnostics"]);
}

#[test]
fn decisions_prints_the_compiled_switch() {
    let dir = temp_dir("decisions");
    let path = write_unit(&dir, &complete());
    let out = blossom(&["decisions", &path, "--function", "area"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("fn area"), "{text}");
    assert!(text.contains("switch s"), "{text}");
}

#[test]
fn unknown_function_is_an_error() {
    let dir = temp_dir("nofn");
    let path = write_unit(&dir, &complete());
    let out = blossom(&["cfg", &path, "--function", "perimeter"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("perimeter"));
}

#[test]
fn cfg_prints_the_lowered_body() {
    let dir = temp_dir("cfg");
    let path = write_unit(&dir, &complete());
    let out = blossom(&["cfg", &path]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("area"), "{}", stdout(&out));
}

#[test]
fn explain_accepts_snake_case_names() {
    let out = blossom(&["explain", "use_after_move"]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("UseAfterMove (blossom::use_after_move)"));

    let out = blossom(&["explain", "NoSuchThing"]);
    assert!(!out.status.success());
}
