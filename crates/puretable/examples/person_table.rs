//! Create, read, append to and overwrite a table of people.
//!
//! ```text
//! cargo run --example person_table -- [path]
//! RUST_LOG=puretable=debug cargo run --example person_table
//! ```

use std::process::ExitCode;

use puretable::{
    append_records, create_table, read_records, read_table, str_from_fixed, write_records,
    FileContainer, Record, TableOptions,
};
use tracing_subscriber::EnvFilter;

const NUM_RECS: u64 = 10000;

#[derive(Record, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
struct Person {
    name: [u8; 32],
    age: u8,
    weight: i32,
    #[record(rename = "IQ")]
    iq: f32,
}

fn print_person(label: &str, p: &Person) {
    println!(
        "{label} Name({}) Age({}) Weight({}) IQ({:.6})",
        str_from_fixed(&p.name),
        p.age,
        p.weight,
        p.iq
    );
}

fn run(path: &str) -> puretable::Result<()> {
    let people: Vec<Person> = (0..NUM_RECS)
        .map(|i| Person {
            name: puretable::fixed_str("Mitch Richling"),
            age: (i + 23) as u8,
            weight: 123 + i as i32,
            iq: 200.0 - (i as f32 * 2.5 + 2.0) / (i as f32 + 1.0),
        })
        .collect();
    let schema = Person::schema()?;
    let mut file = FileContainer::create(path)?;

    print_person("1 From Disk:  ", &people[0]);

    let options = TableOptions::default().with_title("The Table").with_chunk_records(10);
    create_table(&mut file, "dset", &schema, &people, &options)?;

    let all: Vec<Person> = read_table(&file, "dset", &schema)?;
    print_person("2 From Disk:  ", &all[0]);

    let last: Vec<Person> = read_records(&file, "dset", &schema, NUM_RECS - 1, 1)?;
    print_person("3 Last Record:", &last[0]);

    append_records(&mut file, "dset", &schema, &people[..3])?;
    let last: Vec<Person> = read_records(&file, "dset", &schema, NUM_RECS + 2, 1)?;
    print_person("4 Last Record:", &last[0]);

    write_records(&mut file, "dset", &schema, NUM_RECS + 2, &people[..1])?;
    let last: Vec<Person> = read_records(&file, "dset", &schema, NUM_RECS + 2, 1)?;
    print_person("5 Last Record:", &last[0]);

    file.close()?;
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "person_table.ptb".to_string());
    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("person_table: {e}");
            ExitCode::FAILURE
        }
    }
}
