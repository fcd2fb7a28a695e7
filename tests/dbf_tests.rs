mod common;

use common::{coordinates_table, DbfBuilder};
use dbf2netcdf::dbf::DbfReader;
use dbf2netcdf::{load, DbfTable, Error, TextEncoding, Value};
use tempfile::tempdir;

// ============================================================================
// HEADER TESTS
// ============================================================================

#[test]
fn test_header_fields() {
    let data = coordinates_table().build();
    let reader = DbfReader::new(&data).unwrap();
    let header = reader.header();

    assert_eq!(header.version, 0x03);
    assert_eq!(header.last_update, (2024, 1, 15));
    assert_eq!(header.record_count, 2);
    assert_eq!(header.record_length, 21);
    assert_eq!(header.language_driver, 0x57);

    let names: Vec<_> = reader.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["ID", "XCOORD", "YCOORD"]);

    let xcoord = reader.field("XCOORD").unwrap();
    assert_eq!(xcoord.field_type, b'N');
    assert_eq!(xcoord.length, 8);
    assert_eq!(xcoord.decimal_count, 1);
    assert_eq!(xcoord.offset, 5);
}

#[test]
fn test_missing_terminator_is_rejected() {
    let mut data = coordinates_table().build();
    data[32 + 3 * 32] = b'X';
    assert!(DbfReader::new(&data).is_err());
}

#[test]
fn test_record_length_too_small_is_rejected() {
    let mut data = coordinates_table().build();
    data[10] = 4;
    assert!(DbfReader::new(&data).is_err());
}

#[test]
fn test_records_iterate_in_order() {
    let data = coordinates_table().deleted_record(&["3", "0.0", "0.0"]).build();
    let reader = DbfReader::new(&data).unwrap();
    let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();

    assert_eq!(records.len(), 3);
    assert!(!records[0].deleted);
    assert!(records[2].deleted);
    assert_eq!(records[1].field_bytes(reader.field("ID").unwrap()), b"   2");
}

#[test]
fn test_declared_count_beyond_data_is_rejected() {
    let data = coordinates_table().declared_count(5).build();
    assert!(DbfReader::new(&data).is_err());
}

#[test]
fn test_early_eof_marker_ends_records_with_error() {
    let mut data = coordinates_table().build();
    let header = DbfReader::new(&data).unwrap().header().clone();
    data[header.header_length + header.record_length] = 0x1A;

    let reader = DbfReader::new(&data).unwrap();
    let results: Vec<_> = reader.records().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

// ============================================================================
// LOADER TESTS
// ============================================================================

#[test]
fn test_load_projects_fields_in_table_order() {
    let dir = tempdir().unwrap();
    let path = coordinates_table().write_to(dir.path(), "survey.dbf");

    let records = load(&["YCOORD", "ID"], &path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["ID", "YCOORD"]);
    assert_eq!(records[0].get("ID"), Some(&Value::Integer(1)));
    assert_eq!(records[1].get("YCOORD"), Some(&Value::Float(19.8)));
    assert_eq!(records[0].get("XCOORD"), None);
}

#[test]
fn test_load_with_empty_projection() {
    let dir = tempdir().unwrap();
    let path = coordinates_table().write_to(dir.path(), "survey.dbf");

    let records = load::<&str, _>(&[], &path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.is_empty()));
}

#[test]
fn test_load_skips_unknown_fields() {
    let dir = tempdir().unwrap();
    let path = coordinates_table().write_to(dir.path(), "survey.dbf");

    let records = load(&["ID", "DIJKRING"], &path).unwrap();
    assert_eq!(records[0].len(), 1);
}

#[test]
fn test_load_skips_deleted_records() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("ID", b'N', 4, 0)
        .record(&["1"])
        .deleted_record(&["2"])
        .record(&["3"])
        .write_to(dir.path(), "deleted.dbf");

    let ids: Vec<_> = load(&["ID"], &path)
        .unwrap()
        .iter()
        .map(|r| r.get("ID").cloned().unwrap())
        .collect();
    assert_eq!(ids, vec![Value::Integer(1), Value::Integer(3)]);
}

#[test]
fn test_load_decodes_every_supported_type() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("NAAM", b'C', 10, 0)
        .field("DIEPTE", b'N', 6, 2)
        .field("FACTOR", b'F', 8, 3)
        .field("OK", b'L', 1, 0)
        .field("DATUM", b'D', 8, 0)
        .record(&["Zoë", "1.50", "0.125", "T", "20190704"])
        .record(&["", "", "", "?", ""])
        .write_to(dir.path(), "types.dbf");

    let records = load(&["NAAM", "DIEPTE", "FACTOR", "OK", "DATUM"], &path).unwrap();

    assert_eq!(records[0].get("NAAM"), Some(&Value::Text("Zoë".to_string())));
    assert_eq!(records[0].get("DIEPTE"), Some(&Value::Float(1.5)));
    assert_eq!(records[0].get("FACTOR"), Some(&Value::Float(0.125)));
    assert_eq!(records[0].get("OK"), Some(&Value::Logical(true)));
    assert_eq!(records[0].get("DATUM"), Some(&Value::Text("2019-07-04".to_string())));

    assert_eq!(records[1].get("NAAM"), Some(&Value::Text(String::new())));
    assert_eq!(records[1].get("DIEPTE"), Some(&Value::Null));
    assert_eq!(records[1].get("FACTOR"), Some(&Value::Null));
    assert_eq!(records[1].get("OK"), Some(&Value::Null));
    assert_eq!(records[1].get("DATUM"), Some(&Value::Null));
}

#[test]
fn test_load_binary_columns() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("NR", b'I', 4, 0)
        .field("Z", b'O', 8, 0)
        .raw_record(&[(-12i32).to_le_bytes().to_vec(), 3.75f64.to_le_bytes().to_vec()])
        .write_to(dir.path(), "binary.dbf");

    let records = load(&["NR", "Z"], &path).unwrap();
    assert_eq!(records[0].get("NR"), Some(&Value::Integer(-12)));
    assert_eq!(records[0].get("Z"), Some(&Value::Float(3.75)));
}

#[test]
fn test_latin1_encoding() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("NAAM", b'C', 4, 0)
        .raw_record(&[vec![b'Z', b'o', 0xEB]])
        .write_to(dir.path(), "latin1.dbf");

    let records = DbfTable::from_file(&path)
        .unwrap()
        .encoding(TextEncoding::Latin1)
        .read_fields(&["NAAM"])
        .unwrap();
    assert_eq!(records[0].get("NAAM"), Some(&Value::Text("Zoë".to_string())));
}

#[test]
fn test_unrequested_memo_column_is_ignored() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("ID", b'N', 4, 0)
        .field("NOTES", b'M', 10, 0)
        .record(&["1", "         1"])
        .write_to(dir.path(), "memo.dbf");

    assert_eq!(load(&["ID"], &path).unwrap().len(), 1);
    assert!(matches!(
        load(&["NOTES"], &path),
        Err(Error::MalformedSource(_))
    ));
}

#[test]
fn test_field_names_hide_null_flags() {
    let dir = tempdir().unwrap();
    let path = DbfBuilder::new()
        .field("ID", b'N', 4, 0)
        .field("_NullFlags", b'0', 1, 0)
        .record(&["1", ""])
        .write_to(dir.path(), "vfp.dbf");

    let table = DbfTable::from_file(&path).unwrap();
    assert_eq!(table.field_names(), vec!["ID".to_string()]);
}

// ============================================================================
// ERROR TESTS
// ============================================================================

#[test]
fn test_missing_source_is_not_found() {
    let dir = tempdir().unwrap();
    let result = load(&["ID"], dir.path().join("absent.dbf"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_garbage_is_malformed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.dbf");
    std::fs::write(&path, b"this is not a table at all, not even close").unwrap();
    assert!(matches!(load(&["ID"], &path), Err(Error::MalformedSource(_))));
}

#[test]
fn test_empty_file_is_malformed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.dbf");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(load(&["ID"], &path), Err(Error::MalformedSource(_))));
}

#[test]
fn test_huge_declared_count_is_malformed() {
    let dir = tempdir().unwrap();
    let path = coordinates_table()
        .declared_count(u32::MAX)
        .write_to(dir.path(), "huge.dbf");
    assert!(matches!(load(&["ID"], &path), Err(Error::MalformedSource(_))));
}

#[test]
fn test_truncated_table_is_malformed() {
    let dir = tempdir().unwrap();
    let path = coordinates_table()
        .declared_count(4)
        .without_eof_marker()
        .write_to(dir.path(), "short.dbf");
    assert!(matches!(load(&["ID"], &path), Err(Error::MalformedSource(_))));
}
