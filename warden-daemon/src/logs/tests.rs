use super::*;
use tempfile::TempDir;

fn reverse_all(content: &[u8], chunk_size: usize) -> Vec<String> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.log");
    std::fs::write(&path, content).unwrap();
    let mut reader = ReverseLineReader::new(File::open(&path).unwrap())
        .unwrap()
        .with_chunk_size(chunk_size);
    let mut lines = Vec::new();
    while let Some(line) = reader.next_line().unwrap() {
        lines.push(line);
    }
    lines
}

fn count(content: &[u8]) -> usize {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("count.log");
    std::fs::write(&path, content).unwrap();
    count_lines(&mut File::open(&path).unwrap()).unwrap()
}

// ============================================================================
// ReverseLineReader
// ============================================================================

#[test]
fn reverse_reader_yields_last_line_first() {
    assert_eq!(reverse_all(b"a\nb\nc\n", 64), vec!["c", "b", "a"]);
}

#[test]
fn reverse_reader_handles_missing_trailing_newline() {
    assert_eq!(reverse_all(b"a\nb", 64), vec!["b", "a"]);
}

#[test]
fn reverse_reader_keeps_empty_lines() {
    assert_eq!(reverse_all(b"a\n\nb\n\n", 64), vec!["", "b", "", "a"]);
    assert_eq!(reverse_all(b"\n", 64), vec![""]);
}

#[test]
fn reverse_reader_empty_file_has_no_lines() {
    assert!(reverse_all(b"", 64).is_empty());
}

#[test]
fn reverse_reader_strips_carriage_returns() {
    assert_eq!(reverse_all(b"one\r\ntwo\r\n", 64), vec!["two", "one"]);
}

#[test]
fn reverse_reader_is_independent_of_chunk_size() {
    let content = b"first line\n\nthird is a bit longer\nx\n\nlast";
    let expected = reverse_all(content, 1024);
    for chunk_size in [1, 2, 3, 5, 7, 11] {
        assert_eq!(reverse_all(content, chunk_size), expected, "chunk size {}", chunk_size);
    }
}

#[test]
fn reverse_reader_replaces_invalid_utf8() {
    let lines = reverse_all(b"ok\n\xff\xfebad\n", 4);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("bad"));
    assert_eq!(lines[1], "ok");
}

// ============================================================================
// count_lines
// ============================================================================

#[test]
fn count_lines_matches_forward_reading() {
    assert_eq!(count(b""), 0);
    assert_eq!(count(b"a"), 1);
    assert_eq!(count(b"a\n"), 1);
    assert_eq!(count(b"a\nb"), 2);
    assert_eq!(count(b"a\n\n"), 2);
    assert_eq!(count(b"\n"), 1);
}

// ============================================================================
// LogFiles
// ============================================================================

fn write_numbered(dir: &Path, name: &str, n: usize) {
    let content: String = (1..=n).map(|i| format!("line {}\n", i)).collect();
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn tail_returns_last_lines_in_order() {
    let dir = TempDir::new().unwrap();
    write_numbered(dir.path(), "out.log", 100);
    let logs = LogFiles::new(dir.path());

    let tail = logs.tail("out.log", 3).unwrap();
    assert_eq!(tail.name, "out.log");
    assert_eq!(tail.lines, vec!["line 98", "line 99", "line 100"]);
    assert_eq!(tail.total_lines, 100);
    assert_eq!(
        tail.size_bytes,
        std::fs::metadata(dir.path().join("out.log")).unwrap().len()
    );
}

#[test]
fn tail_of_short_file_returns_everything() {
    let dir = TempDir::new().unwrap();
    write_numbered(dir.path(), "error.log", 2);
    let logs = LogFiles::new(dir.path());

    let tail = logs.tail("error.log", 50).unwrap();
    assert_eq!(tail.lines, vec!["line 1", "line 2"]);
}

#[test]
fn tail_zero_lines_is_empty() {
    let dir = TempDir::new().unwrap();
    write_numbered(dir.path(), "out.log", 5);
    let logs = LogFiles::new(dir.path());

    let tail = logs.tail("out.log", 0).unwrap();
    assert!(tail.lines.is_empty());
    assert_eq!(tail.total_lines, 5);
}

#[test]
fn tail_rejects_names_outside_allow_list() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ZBProxy.json"), "{}").unwrap();
    let logs = LogFiles::new(dir.path());

    for name in ["ZBProxy.json", "../out.log", "/etc/passwd", ""] {
        let err = logs.tail(name, 10).unwrap_err();
        assert!(matches!(err, LogError::NotAllowed { .. }), "{:?}", name);
        assert_eq!(err.kind(), warden_protocol::protocol::ErrorKind::NotAllowed);
    }
}

#[test]
fn tail_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let logs = LogFiles::new(dir.path());

    let err = logs.tail("access.log", 10).unwrap_err();
    assert!(matches!(err, LogError::NotFound(_)));
}

#[test]
fn overview_covers_every_known_file() {
    let dir = TempDir::new().unwrap();
    write_numbered(dir.path(), "out.log", 250);
    write_numbered(dir.path(), "access.log", 3);
    let logs = LogFiles::new(dir.path());

    let overview = logs.overview(200);
    let names: Vec<_> = overview.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, LOG_FILES.to_vec());

    let out = &overview[0];
    assert!(out.present);
    assert_eq!(out.lines.len(), 200);
    assert_eq!(out.lines.first().unwrap(), "line 51");
    assert_eq!(out.total_lines, 250);

    let zbproxy = &overview[1];
    assert!(!zbproxy.present);
    assert!(zbproxy.lines.is_empty());
    assert_eq!(zbproxy.size_bytes, 0);

    let access = &overview[3];
    assert!(access.present);
    assert_eq!(access.lines, vec!["line 1", "line 2", "line 3"]);
    assert_eq!(access.error, None);
}

#[test]
fn clear_truncates_existing_files_only() {
    let dir = TempDir::new().unwrap();
    write_numbered(dir.path(), "out.log", 10);
    write_numbered(dir.path(), "zbproxy.log", 10);
    std::fs::write(dir.path().join("other.log"), "keep\n").unwrap();
    let logs = LogFiles::new(dir.path());

    let report = logs.clear();
    assert_eq!(report.cleared, vec!["out.log", "zbproxy.log"]);
    assert!(report.failed.is_empty());

    assert_eq!(std::fs::metadata(dir.path().join("out.log")).unwrap().len(), 0);
    assert_eq!(std::fs::metadata(dir.path().join("zbproxy.log")).unwrap().len(), 0);
    assert!(!dir.path().join("error.log").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("other.log")).unwrap(),
        "keep\n"
    );
}

#[test]
fn clear_with_no_files_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let report = LogFiles::new(dir.path()).clear();
    assert!(report.cleared.is_empty());
    assert!(report.failed.is_empty());
}
