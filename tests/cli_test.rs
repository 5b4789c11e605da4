// ==========================================
// 外勤运营平台 - 命令行集成测试
// ==========================================
// 覆盖: import --json 时 stdout 只有机器可读结果，
//       提示消息与报告路径走 stderr
// ==========================================


use std::process::{Command, Output};
use test_helpers::{appointment_csv, create_test_db, AppointmentRow};

fn fieldops(db_path: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fieldops-import"))
        .env_remove("FIELDOPS_ENDPOINT")
        .env_remove("FIELDOPS_TOKEN")
        .env_remove("FIELDOPS_DB_PATH")
        .arg("--db")
        .arg(db_path)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_json_import_keeps_stdout_machine_readable() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let seeded = fieldops(&db_path, &["seed-demo"]);
    assert!(seeded.status.success(), "{}", String::from_utf8_lossy(&seeded.stderr));

    let work_dir = tempfile::tempdir().unwrap();
    let source = work_dir.path().join("agenda.csv");
    let csv = appointment_csv(&[
        AppointmentRow::default(),
        AppointmentRow {
            service: "Pintura",
            ..Default::default()
        },
    ]);
    std::fs::write(&source, csv).unwrap();
    let report_dir = work_dir.path().join("reports");

    let output = fieldops(
        &db_path,
        &[
            "--report-dir",
            report_dir.to_str().unwrap(),
            "--yes",
            "import",
            source.to_str().unwrap(),
            "--kind",
            "appointment",
            "--json",
        ],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{}", stderr);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["entityKind"], "appointment");
    assert_eq!(value["errorCount"], 1);

    assert!(stderr.contains("1 of 2 rows have errors"));
    assert!(stderr.contains("Report saved to"));
    assert_eq!(std::fs::read_dir(&report_dir).unwrap().count(), 1);
}
