//! End-to-end table operations against file containers.

use std::mem::{offset_of, size_of};

use puretable::{
    append_records, create_table, field_info, fixed_str, read_records, read_table, str_from_fixed,
    table_exists, table_info, write_records, Error, FieldType, FileContainer, OpenMode, Record,
    Schema, SchemaBuilder, StorageError, TableOptions,
};

#[derive(Record, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
struct Person {
    name: [u8; 32],
    age: u8,
    weight: i32,
    #[record(rename = "IQ")]
    iq: f32,
}

fn person(i: u64) -> Person {
    Person {
        name: fixed_str("Mitch Richling"),
        age: ((23 + i) % 256) as u8,
        weight: 123 + i as i32,
        iq: (200.0 - (2.5 * i as f64 + 2.0) / (i as f64 + 1.0)) as f32,
    }
}

fn people(range: std::ops::Range<u64>) -> Vec<Person> {
    range.map(person).collect()
}

fn schema() -> Schema {
    Person::schema().unwrap()
}

#[test]
fn person_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.ptb");
    let schema = schema();
    let mut file = FileContainer::create(&path).unwrap();

    create_table(&mut file, "dset", &schema, &people(0..10000), &TableOptions::default()).unwrap();
    assert_eq!(table_info(&file, "dset").unwrap().nrecords, 10000);

    let copies = [person(0); 3];
    append_records(&mut file, "dset", &schema, &copies).unwrap();
    assert_eq!(table_info(&file, "dset").unwrap().nrecords, 10003);

    let last: Vec<Person> = read_records(&file, "dset", &schema, 10002, 1).unwrap();
    assert_eq!(last, vec![person(0)]);
    assert_eq!(str_from_fixed(&last[0].name), "Mitch Richling");

    write_records(&mut file, "dset", &schema, 10002, &[person(0)]).unwrap();
    let again: Vec<Person> = read_records(&file, "dset", &schema, 10002, 1).unwrap();
    assert_eq!(again, last);

    let middle: Vec<Person> = read_records(&file, "dset", &schema, 4990, 20).unwrap();
    assert_eq!(middle, people(4990..5010));
    assert_eq!(middle[10].age, ((23 + 5000) % 256) as u8);
    file.close().unwrap();
}

#[test]
fn append_to_unknown_table_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unknown.ptb");
    let schema = schema();
    let mut file = FileContainer::create(&path).unwrap();
    create_table(&mut file, "dset", &schema, &people(0..3), &TableOptions::default()).unwrap();
    let before = std::fs::read(&path).unwrap();

    let err = append_records(&mut file, "missing", &schema, &people(0..2)).unwrap_err();
    assert!(matches!(err, Error::UnknownTable(ref name) if name == "missing"));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(!table_exists(&file, "missing").unwrap());
}

#[test]
fn write_never_grows() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let mut file = FileContainer::create(dir.path().join("grow.ptb")).unwrap();
    let options = TableOptions::default().with_chunk_records(4);
    create_table(&mut file, "dset", &schema, &people(0..10), &options).unwrap();

    write_records(&mut file, "dset", &schema, 7, &people(100..103)).unwrap();
    assert_eq!(table_info(&file, "dset").unwrap().nrecords, 10);

    let err = write_records(&mut file, "dset", &schema, 8, &people(0..3)).unwrap_err();
    assert!(matches!(
        err,
        Error::IndexOutOfRange { start: 8, count: 3, nrecords: 10, .. }
    ));
    let all: Vec<Person> = read_table(&file, "dset", &schema).unwrap();
    assert_eq!(all.len(), 10);
    assert_eq!(all[7..], people(100..103)[..]);
}

#[test]
fn reads_are_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let mut file = FileContainer::create(dir.path().join("repeat.ptb")).unwrap();
    create_table(&mut file, "dset", &schema, &people(0..50), &TableOptions::default()).unwrap();

    let first: Vec<Person> = read_records(&file, "dset", &schema, 13, 21).unwrap();
    let second: Vec<Person> = read_records(&file, "dset", &schema, 13, 21).unwrap();
    assert_eq!(first, second);
}

#[test]
fn append_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let mut file = FileContainer::create(dir.path().join("append.ptb")).unwrap();
    let options = TableOptions::default().with_chunk_records(7);
    create_table(&mut file, "dset", &schema, &people(0..5), &options).unwrap();

    let mut expected = 5;
    for k in [1u64, 2, 9, 20] {
        let batch = people(1000 * k..1000 * k + k);
        append_records(&mut file, "dset", &schema, &batch).unwrap();
        let got: Vec<Person> = read_records(&file, "dset", &schema, expected, k).unwrap();
        assert_eq!(got, batch);
        expected += k;
        assert_eq!(table_info(&file, "dset").unwrap().nrecords, expected);
    }
}

#[test]
fn tables_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.ptb");
    let schema = schema();
    {
        let mut file = FileContainer::create(&path).unwrap();
        let options = TableOptions::default().with_title("people").with_chunk_records(16);
        create_table(&mut file, "dset", &schema, &people(0..40), &options).unwrap();
        create_table(&mut file, "other", &schema, &people(40..41), &TableOptions::default()).unwrap();
    }
    {
        let mut file = FileContainer::open(&path, OpenMode::ReadWrite).unwrap();
        append_records(&mut file, "dset", &schema, &people(40..45)).unwrap();
        file.close().unwrap();
    }

    let file = FileContainer::open(&path, OpenMode::ReadOnly).unwrap();
    let info = table_info(&file, "dset").unwrap();
    assert_eq!(info.title, "people");
    assert_eq!(info.nrecords, 45);
    assert_eq!(info.chunk_records, 16);
    assert_eq!(info.record_size, 41);
    assert_eq!(read_table::<_, Person>(&file, "dset", &schema).unwrap(), people(0..45));
    assert_eq!(read_table::<_, Person>(&file, "other", &schema).unwrap(), people(40..41));

    let fields = field_info(&file, "dset").unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["name", "age", "weight", "IQ"]);
    assert_eq!(fields[0].field_type, Some(FieldType::FixedString(32)));
    assert_eq!(fields[3].disk_offset, 37);
}

#[test]
fn compressed_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deflate.ptb");
    let schema = schema();
    let mut file = FileContainer::create(&path).unwrap();
    let options = TableOptions::default().with_chunk_records(100).with_deflate(6);
    create_table(&mut file, "dset", &schema, &people(0..1000), &options).unwrap();
    append_records(&mut file, "dset", &schema, &people(1000..1050)).unwrap();
    write_records(&mut file, "dset", &schema, 95, &people(5000..5010)).unwrap();
    file.close().unwrap();

    // identical names compress well
    assert!(std::fs::metadata(&path).unwrap().len() < 1050 * 41);

    let file = FileContainer::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(table_info(&file, "dset").unwrap().compressed);
    let all: Vec<Person> = read_table(&file, "dset", &schema).unwrap();
    let mut expected = people(0..1050);
    expected[95..105].copy_from_slice(&people(5000..5010));
    assert_eq!(all, expected);
}

#[test]
fn name_collision_keeps_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let mut file = FileContainer::create(dir.path().join("collide.ptb")).unwrap();
    create_table(&mut file, "dset", &schema, &people(0..3), &TableOptions::default()).unwrap();
    let err = create_table(&mut file, "dset", &schema, &people(10..20), &TableOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NameCollision(_)));
    assert_eq!(read_table::<_, Person>(&file, "dset", &schema).unwrap(), people(0..3));
}

#[test]
fn read_only_surfaces_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.ptb");
    let schema = schema();
    {
        let mut file = FileContainer::create(&path).unwrap();
        create_table(&mut file, "dset", &schema, &people(0..3), &TableOptions::default()).unwrap();
    }
    let mut file = FileContainer::open(&path, OpenMode::ReadOnly).unwrap();
    let err = append_records(&mut file, "dset", &schema, &people(3..4)).unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::ReadOnly(_))));
    assert_eq!(table_info(&file, "dset").unwrap().nrecords, 3);
}

#[test]
fn oversized_chunks_leave_the_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.ptb");
    let schema = schema();
    let mut file = FileContainer::create(&path).unwrap();
    let before = std::fs::read(&path).unwrap();

    for chunk_records in [u64::MAX, 1 << 40] {
        let options = TableOptions::default().with_chunk_records(chunk_records);
        let err = create_table(&mut file, "dset", &schema, &people(0..1), &options).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkSize(n) if n == chunk_records));
    }
    assert!(!table_exists(&file, "dset").unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn schema_reaching_into_padding_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("padding.ptb");
    let mut file = FileContainer::create(&path).unwrap();

    // `age` is followed by padding up to `weight`
    let mut b = SchemaBuilder::new();
    b.describe_field("tail", FieldType::FixedString(3), offset_of!(Person, age) + 1, 3)
        .unwrap();
    let padding = b.finalize(size_of::<Person>()).unwrap();
    let err = create_table(&mut file, "pad", &padding, &people(0..1), &TableOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::FieldOutsideRecord { ref name, .. } if name == "tail"));
    assert!(!table_exists(&file, "pad").unwrap());

    create_table(&mut file, "pad", &schema(), &people(0..2), &TableOptions::default()).unwrap();
    let err = append_records(&mut file, "pad", &padding, &people(2..3)).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));
    assert_eq!(table_info(&file, "pad").unwrap().nrecords, 2);
}

#[test]
fn over_long_names_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("names.ptb");
    let schema = schema();
    let mut file = FileContainer::create(&path).unwrap();
    let long = "x".repeat(70_000);

    let err = create_table(&mut file, &long, &schema, &people(0..1), &TableOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NameTooLong(70_000)));
    let options = TableOptions::default().with_title(long.clone());
    let err = create_table(&mut file, "dset", &schema, &people(0..1), &options).unwrap_err();
    assert!(matches!(err, Error::NameTooLong(70_000)));
    file.close().unwrap();

    let file = FileContainer::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(!table_exists(&file, &long).unwrap());
    assert!(!table_exists(&file, "dset").unwrap());
}
