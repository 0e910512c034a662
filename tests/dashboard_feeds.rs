mod test_support;

use chrono::{Duration, Local};
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn empty_workspace_has_counts_but_no_percentages() {
    let workspace = temp_dir("rosterd-dashboard-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let dash = request_ok(&mut stdin, &mut reader, "2", "dashboard.open", json!({}));
    let stats = &dash["stats"];
    assert_eq!(stats["totalStudents"], json!(0));
    assert_eq!(stats["totalClasses"], json!(0));
    assert!(stats["todayAttendance"].is_null());
    assert!(stats["averageMarks"].is_null());
    assert_eq!(dash["unavailable"], json!([]));
    assert_eq!(dash["activity"], json!([]));
    assert_eq!(dash["upcoming"], json!([]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn dashboard_combines_every_source() {
    let workspace = temp_dir("rosterd-dashboard");
    let now = Local::now();
    let today = now.date_naive().format("%Y-%m-%d").to_string();
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );

    let creates = vec![
        json!({ "kind": "student", "payload": {
            "studentID": "S1", "firstName": "Asha", "grade": 7, "section": "A",
            "sessionExpiry": (now + Duration::hours(2)).to_rfc3339(),
        }}),
        json!({ "kind": "student", "payload": {
            "studentID": "S2", "firstName": "Bilal", "grade": 7, "section": "A",
        }}),
        json!({ "kind": "student", "payload": {
            "studentID": "S3", "firstName": "Chen", "grade": 8, "section": "C",
        }}),
        json!({ "kind": "attendance", "payload": {
            "studentID": "S1", "status": "Present", "date": today,
        }}),
        json!({ "kind": "attendance", "payload": {
            "studentID": "S2", "status": "Absent", "date": today,
        }}),
        json!({ "kind": "mark", "payload": {
            "studentID": "S1", "subject": "Mathematics", "examType": "Final",
            "semester": "Spring 2024", "marksObtained": 40, "totalMarks": 50,
            "date": now.to_rfc3339(),
        }}),
        json!({ "kind": "mark", "payload": {
            "studentID": "S2", "subject": "Mathematics", "examType": "Final",
            "semester": "Spring 2024", "marksObtained": 30, "totalMarks": 50,
            "date": now.to_rfc3339(),
        }}),
        json!({ "kind": "homework", "payload": {
            "studentID": "S1", "title": "Fractions worksheet", "description": "Pages 4-6",
            "assignDate": today, "dueDate": "2099-01-02",
        }}),
        json!({ "kind": "notice", "payload": {
            "title": "Sports day", "description": "Bring kit", "classID": "7A",
            "date": now.to_rfc3339(),
        }}),
        json!({ "kind": "calendarEvent", "payload": {
            "title": "New year", "date": "2099-01-01", "category": "Holiday",
        }}),
    ];
    for (i, params) in creates.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("c{}", i), "records.create", params);
    }

    let dash = request_ok(&mut stdin, &mut reader, "2", "dashboard.open", json!({}));
    let stats = &dash["stats"];
    assert_eq!(stats["totalStudents"], json!(3));
    assert_eq!(stats["totalClasses"], json!(2));
    assert_eq!(stats["homeworkToday"], json!(1));
    assert_eq!(stats["todayAttendance"].as_f64(), Some(50.0));
    assert_eq!(stats["averageMarks"].as_f64(), Some(70.0));
    assert_eq!(stats["activeStudents"], json!(1));
    assert_eq!(stats["recentNotices"], json!(1));
    assert_eq!(dash["gradeDistribution"]["Grade 7"], json!(2));
    assert_eq!(dash["unavailable"], json!([]));

    let activity = dash["activity"].as_array().expect("activity");
    assert!(activity.len() <= 8);
    for kind in ["assignment", "attendance", "marks", "notice"] {
        assert!(
            activity.iter().any(|a| a["type"] == json!(kind)),
            "no {} activity in {:?}",
            kind,
            activity
        );
    }

    let upcoming = dash["upcoming"].as_array().expect("upcoming");
    assert_eq!(upcoming.len(), 2);
    assert_eq!(upcoming[0]["type"], json!("holiday"));
    assert_eq!(upcoming[1]["type"], json!("assignment"));
    assert_eq!(upcoming[1]["title"], json!("Fractions worksheet"));

    drop(stdin);
    let _ = child.wait();
}
