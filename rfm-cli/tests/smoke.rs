use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use std::time::{Duration, UNIX_EPOCH};

fn rfm() -> Command {
    Command::cargo_bin("rfm").unwrap()
}

fn set_mtime(path: &std::path::Path, secs: u64) {
    let f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    f.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

#[test]
fn create_add_display_remove_flow() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("a.txt");
    data.write_str("hello").unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();
    let data_arg = data.path().to_str().unwrap();

    rfm().args(["create", table_arg, "--description", "smoke table"]).assert().success();

    rfm().args(["add", table_arg, "a", data_arg]).assert().success();

    rfm()
        .args(["display", table_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke table"))
        .stdout(predicate::str::contains("a "))
        .stdout(predicate::str::contains("local"));

    rfm().args(["remove", table_arg, "a"]).assert().success();

    rfm()
        .args(["display", table_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("local").not());
}

#[test]
fn bare_remote_add_records_sentinel_marks() {
    let td = assert_fs::TempDir::new().unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();

    rfm().args(["create", table_arg]).assert().success();
    rfm()
        .args(["add", table_arg, "file1", "files/file1.txt", "--bare", "--remote", "user@h"])
        .assert()
        .success();

    rfm()
        .args(["display", table_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("user@h:/files/file1.txt"))
        .stdout(predicate::str::contains("none"));
}

#[test]
fn adding_a_missing_file_fails_without_bare() {
    let td = assert_fs::TempDir::new().unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();
    let ghost = td.child("ghost.txt");
    let ghost_arg = ghost.path().to_str().unwrap();

    rfm().args(["create", table_arg]).assert().success();
    rfm()
        .args(["add", table_arg, "ghost", ghost_arg])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not reachable"));
}

#[test]
fn massive_add_ingests_every_file() {
    let td = assert_fs::TempDir::new().unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();

    let mut files = Vec::new();
    for i in 0..12 {
        let f = td.child(format!("f{i:02}.dat"));
        f.write_str(&format!("payload {i}")).unwrap();
        files.push(f.path().to_str().unwrap().to_string());
    }

    rfm().args(["create", table_arg]).assert().success();
    let mut cmd = rfm();
    cmd.args(["add-massive", table_arg, "--nproc", "4", "--files"]);
    cmd.args(&files);
    cmd.assert().success().stdout(predicate::str::contains("Added 12 file(s)"));

    let out = rfm().args(["display", table_arg]).assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    for i in 0..12 {
        assert!(stdout.contains(&format!("f{i:02}")), "missing entry f{i:02}");
    }
}

#[test]
fn add_from_dir_honors_excludes() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("data");
    data.create_dir_all().unwrap();
    data.child("keep.dat").write_str("k").unwrap();
    data.child("skip.log").write_str("s").unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();
    let dir_arg = data.path().to_str().unwrap();

    rfm().args(["create", table_arg]).assert().success();
    rfm()
        .args(["add-from-dir", table_arg, dir_arg, "--exclude", "*.log"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 1 file(s)"));

    rfm()
        .args(["display", table_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("keep"))
        .stdout(predicate::str::contains("skip").not());
}

#[test]
fn update_propagates_the_newest_replica() {
    let td = assert_fs::TempDir::new().unwrap();
    let d1 = td.child("host1");
    let d2 = td.child("host2");
    d1.create_dir_all().unwrap();
    d2.create_dir_all().unwrap();

    let f1 = d1.child("x.txt");
    let f2 = d2.child("x.txt");
    f1.write_str("new content").unwrap();
    f2.write_str("stale content").unwrap();
    set_mtime(f1.path(), 100);
    set_mtime(f2.path(), 50);

    let t1 = d1.child("table.json");
    let t2 = d2.child("table.json");
    let t1_arg = t1.path().to_str().unwrap();
    let t2_arg = t2.path().to_str().unwrap();
    let f1_arg = f1.path().to_str().unwrap();
    let f2_arg = f2.path().to_str().unwrap();

    rfm().args(["create", t1_arg]).assert().success();
    rfm().args(["add", t1_arg, "x", f1_arg]).assert().success();
    rfm().args(["create", t2_arg]).assert().success();
    rfm().args(["add", t2_arg, "x", f2_arg]).assert().success();

    rfm()
        .args(["update", t1_arg, t2_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("Synchronized 1/1 file(s)"));

    assert_eq!(std::fs::read_to_string(f2.path()).unwrap(), "new content");

    // A second run has nothing left to do.
    rfm()
        .args(["update", t1_arg, t2_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("All files are up to date"));
}

#[test]
fn replicate_declares_entries_for_another_host() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("d.txt");
    data.write_str("payload").unwrap();

    let src = td.child("src.json");
    let dst = td.child("dst.json");
    let src_arg = src.path().to_str().unwrap();
    let dst_arg = dst.path().to_str().unwrap();
    let data_arg = data.path().to_str().unwrap();

    rfm().args(["create", src_arg]).assert().success();
    rfm().args(["add", src_arg, "d", data_arg]).assert().success();
    rfm().args(["create", dst_arg]).assert().success();
    rfm()
        .args(["replicate", dst_arg, "--source", src_arg, "--remote", "user@h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Declared 1 entry"));

    rfm()
        .args(["display", dst_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("user@h:"))
        .stdout(predicate::str::contains("none"));
}

#[test]
fn remove_with_regex_deletes_matching_entries() {
    let td = assert_fs::TempDir::new().unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();

    rfm().args(["create", table_arg]).assert().success();
    for name in ["run_001", "run_002", "calib"] {
        let f = td.child(format!("{name}.dat"));
        f.write_str(name).unwrap();
        let f_arg = f.path().to_str().unwrap().to_string();
        rfm().args(["add", table_arg, name, f_arg.as_str()]).assert().success();
    }

    rfm()
        .args(["remove", table_arg, "--regex", "^run_"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 entries"));

    rfm()
        .args(["display", table_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("calib"))
        .stdout(predicate::str::contains("run_").not());
}

#[test]
fn unknown_entry_removal_exits_nonzero() {
    let td = assert_fs::TempDir::new().unwrap();
    let table = td.child("t.json");
    let table_arg = table.path().to_str().unwrap();

    rfm().args(["create", table_arg]).assert().success();
    rfm()
        .args(["remove", table_arg, "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}
