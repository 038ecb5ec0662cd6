use std::{
    fs,
    path::Path,
    process::{Command as StdCommand, Stdio},
};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use image::{
    DynamicImage, ImageBuffer, Rgb,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary, run inside `dir` with no ambient configuration.
fn imguard(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("imguard");
    cmd.current_dir(dir)
        .env_remove("IMGUARD_CONFIG_PATH")
        .env_remove("IMGUARD_CONFIG_JSON")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn loose_png() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |x, y| {
        Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
    }));
    let mut bytes = Vec::new();
    image
        .write_with_encoder(PngEncoder::new_with_quality(
            &mut bytes,
            CompressionType::Fast,
            FilterType::NoFilter,
        ))
        .expect("encode fixture");
    bytes
}

fn write(dir: &Path, rel: &str, bytes: &[u8]) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, bytes).expect("write fixture");
}

fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run git");
    assert!(status.success(), "git {args:?} failed");
}

#[test]
fn help_lists_every_flag() {
    let output = cargo_bin_cmd!("imguard")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for flag in [
        "--dry",
        "--ignore",
        "--staged",
        "--quiet",
        "--config",
        "--concurrency",
    ] {
        assert!(text.contains(flag), "help missing {flag}");
    }
}

#[test]
fn empty_directory_has_nothing_to_do() {
    let dir = TempDir::new().expect("tempdir");
    imguard(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "(Search pattern: avif, gif, jpg, jpeg, png, webp)",
        ))
        .stdout(predicate::str::contains("There were no images to compress."));
}

#[test]
fn dry_run_reports_savings_without_touching_files() {
    let dir = TempDir::new().expect("tempdir");
    let png = loose_png();
    write(dir.path(), "img/photo.png", &png);

    imguard(dir.path())
        .arg("--dry")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: Compressed"))
        .stdout(predicate::str::contains("photo.png"))
        .stdout(predicate::str::contains("You would save"));

    assert_eq!(fs::read(dir.path().join("img/photo.png")).unwrap(), png);
    assert_eq!(fs::read_dir(dir.path().join("img")).unwrap().count(), 1);
}

#[test]
fn real_run_shrinks_in_place() {
    let dir = TempDir::new().expect("tempdir");
    let png = loose_png();
    write(dir.path(), "photo.PNG", &png);

    imguard(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed photo.PNG"))
        .stdout(predicate::str::contains(
            "Defensive base compression completed. You saved",
        ));

    let after = fs::read(dir.path().join("photo.PNG")).unwrap();
    assert!(after.len() < png.len());
    image::load_from_memory(&after).expect("result still decodes");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn ignored_and_corrupt_files_are_left_alone() {
    let dir = TempDir::new().expect("tempdir");
    let png = loose_png();
    write(dir.path(), "vendor/logo.png", &png);
    write(dir.path(), "broken.gif", b"GIF89a not really");

    imguard(dir.path())
        .arg("--ignore=vendor/")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped broken.gif (corrupt file)"))
        .stdout(predicate::str::contains("logo.png").not());

    assert_eq!(fs::read(dir.path().join("vendor/logo.png")).unwrap(), png);
    assert_eq!(
        fs::read(dir.path().join("broken.gif")).unwrap(),
        b"GIF89a not really"
    );
}

#[test]
fn quiet_keeps_only_the_summary() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "a.png", &loose_png());

    imguard(dir.path())
        .args(["--dry", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed").not())
        .stdout(predicate::str::contains("You would save"));
}

#[test]
fn invalid_config_aborts_the_run() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "imguard.toml", b"[pipeline]\nmax_concurrency = 0\n");
    write(dir.path(), "a.png", &loose_png());

    imguard(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrency"));
}

#[test]
fn config_from_environment_is_honoured() {
    let dir = TempDir::new().expect("tempdir");
    let png = loose_png();
    write(dir.path(), "a.png", &png);

    imguard(dir.path())
        .env(
            "IMGUARD_CONFIG_JSON",
            r#"{"discovery": {"extensions": ["gif"]}}"#,
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("(Search pattern: gif)"))
        .stdout(predicate::str::contains("There were no images to compress."));

    assert_eq!(fs::read(dir.path().join("a.png")).unwrap(), png);
}

#[test]
fn staged_mode_and_gitignore_follow_git() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = TempDir::new().expect("tempdir");
    let png = loose_png();
    git(dir.path(), &["init", "--quiet"]);
    write(dir.path(), ".gitignore", b"sub/\n");
    write(dir.path(), "staged.png", &png);
    write(dir.path(), "unstaged.png", &png);
    write(dir.path(), "sub/ignored.png", &png);
    git(dir.path(), &["add", "staged.png"]);

    let read = |rel: &str| fs::read(dir.path().join(rel)).unwrap();

    imguard(dir.path())
        .arg("--staged")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed staged.png"))
        .stdout(predicate::str::contains("unstaged.png").not())
        .stdout(predicate::str::contains("ignored.png").not());
    assert!(read("staged.png").len() < png.len());
    assert_eq!(read("unstaged.png"), png);
    assert_eq!(read("sub/ignored.png"), png);

    imguard(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Compressed unstaged.png"))
        .stdout(predicate::str::contains("ignored.png").not());
    assert!(read("unstaged.png").len() < png.len());
    assert_eq!(read("sub/ignored.png"), png);
}
