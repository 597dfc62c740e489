use std::path::PathBuf;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_scrollmotion")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "scrollmotion.exe"
            } else {
                "scrollmotion"
            });
            p
        })
}

fn fixture() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("hero_scene.json")
        .to_string_lossy()
        .to_string()
}

#[test]
fn cli_validate_accepts_fixture() {
    let status = std::process::Command::new(exe())
        .args(["validate", "--in", fixture().as_str()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn cli_simulate_prints_json_lines() {
    let out = std::process::Command::new(exe())
        .args([
            "simulate",
            "--in",
            fixture().as_str(),
            "--frames",
            "30",
            "--fps",
            "60",
            "--from",
            "0",
            "--to",
            "1600",
            "--settle",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(!lines.is_empty());
    for v in &lines {
        assert!(v["frame"].as_u64().is_some());
        assert!(v["property"].is_string());
        assert!(v["value"].as_f64().is_some_and(f64::is_finite));
    }
    // First frame flushes every bound output of every region.
    let first = lines.iter().filter(|v| v["frame"] == 1).count();
    assert_eq!(first, 7);
}

#[test]
fn cli_rejects_missing_scene() {
    let status = std::process::Command::new(exe())
        .args(["validate", "--in", "does/not/exist.json"])
        .status()
        .unwrap();
    assert!(!status.success());
}
