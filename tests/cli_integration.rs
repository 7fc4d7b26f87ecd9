use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("wfpack").unwrap();
    cmd.arg("--no-color");
    cmd
}

const MANIFEST: &str = r#"name = "Demo"
version = "1.2.0"
bundleid = "com.example.demo"

[variables]
GREETING = "hello"
API_KEY = { value = "secret", export = false }
"#;

const FILES: [(&str, &str); 4] = [
    ("workflow.toml", MANIFEST),
    ("main.py", "print('hi')\n"),
    ("icons/icon.png", "png"),
    (".env", "SECRET=1"),
];

fn workflow(root: &Path) -> PathBuf {
    let src = root.join("src");
    for (rel, content) in FILES {
        let path = src.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }
    src
}

#[test]
fn build_prints_archive_path() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());
    let out = tmp.path().join("out");

    bin()
        .arg("build")
        .arg(&src)
        .arg("-o")
        .arg(&out)
        .arg("--build-dir")
        .arg(tmp.path().join("builds"))
        .arg("--verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo-1.2.0.wfpkg"))
        .stdout(predicate::str::contains("API_KEY"));

    assert!(out.join("Demo-1.2.0.wfpkg").is_file());
    assert_eq!(fs::read_to_string(src.join("workflow.toml")).unwrap(), MANIFEST);
}

#[test]
fn build_uses_extension_from_flag_and_config() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());
    fs::write(src.join("wfpack.toml"), "[package]\nextension = \"alfredworkflow\"\noutput = \"dist\"\n").unwrap();

    bin()
        .arg("build")
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo-1.2.0.alfredworkflow"));
    assert!(src.join("dist/Demo-1.2.0.alfredworkflow").is_file());

    // the previous archive inside the source tree is not packaged again
    bin()
        .arg("build")
        .arg(&src)
        .arg("--extension")
        .arg("zip")
        .assert()
        .success();
    assert!(src.join("dist/Demo-1.2.0.zip").is_file());
}

#[test]
fn verify_archive_reports_sanitized_manifest() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());
    let out = tmp.path().join("out");
    bin()
        .args(["build", "--include", "workflow.toml", "--include", "main.py", "--include", "icons"])
        .arg(&src)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    // .env was never packaged
    fs::remove_file(src.join(".env")).unwrap();

    bin()
        .arg("verify")
        .arg(&src)
        .arg(out.join("Demo-1.2.0.wfpkg"))
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("workflow.toml differs"))
        .stdout(predicate::str::contains("main.py").not());
}

#[test]
fn verify_identical_directories() {
    let tmp = tempdir().unwrap();
    let a = workflow(&tmp.path().join("a"));
    let b = workflow(&tmp.path().join("b"));
    for (rel, _) in FILES {
        let modified = fs::metadata(a.join(rel)).unwrap().modified().unwrap();
        fs::OpenOptions::new()
            .write(true)
            .open(b.join(rel))
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    bin()
        .arg("verify")
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stdout(predicate::str::contains("identical"));

    fs::write(b.join("main.py"), "print('bye')\n").unwrap();
    bin()
        .arg("verify")
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stdout(predicate::str::contains("+print('bye')"));
}

#[test]
fn stage_lists_links() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());
    let build = tmp.path().join("build");

    bin()
        .arg("stage")
        .arg(&src)
        .arg(&build)
        .assert()
        .success()
        .stdout(predicate::str::contains("main.py ->"))
        .stdout(predicate::str::contains("workflow.toml (copy)"));

    assert!(build.join("main.py").is_symlink());
    assert!(!build.join(".env").exists());
    let staged = fs::read_to_string(build.join("workflow.toml")).unwrap();
    assert!(!staged.contains("secret"));
}

#[test]
fn var_set_list_unset_flow() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());

    bin()
        .args(["var", "--source"])
        .arg(&src)
        .args(["set", "TOKEN=abc", "--no-export"])
        .assert()
        .success();

    bin()
        .args(["var", "--source"])
        .arg(&src)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("TOKEN=abc (not exported)"))
        .stdout(predicate::str::contains("GREETING=hello"));

    bin()
        .args(["var", "--source"])
        .arg(&src)
        .args(["unset", "TOKEN", "GREETING"])
        .assert()
        .success();

    bin()
        .args(["var", "--source"])
        .arg(&src)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("TOKEN").not())
        .stdout(predicate::str::contains("API_KEY=secret"));
}

#[test]
fn config_init_and_show() {
    let tmp = tempdir().unwrap();
    let src = workflow(tmp.path());

    bin()
        .args(["config", "--source"])
        .arg(&src)
        .arg("init")
        .assert()
        .success();
    assert!(src.join("wfpack.toml").is_file());

    bin()
        .args(["config", "--source"])
        .arg(&src)
        .arg("init")
        .assert()
        .failure()
        .stdout(predicate::str::contains("already exists"));

    bin()
        .args(["config", "--source"])
        .arg(&src)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("extension = \"wfpkg\""))
        .stdout(predicate::str::contains("[[rules]]"));
}

#[test]
fn errors_exit_with_status_one() {
    let tmp = tempdir().unwrap();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    bin()
        .arg("build")
        .arg(&empty)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("IO error"));

    let src = workflow(tmp.path());
    bin()
        .args(["build", "--include", "[oops"])
        .arg(&src)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Invalid glob pattern"));

    fs::write(src.join("wfpack.toml"), "[package\n").unwrap();
    bin()
        .arg("build")
        .arg(&src)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Configuration error"));
}
