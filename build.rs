//! Generates the fixed-width read, unary, and unread jump tables for both
//! bit orders at build time (`spec.md` §4.2, §9: "hand-written table files
//! ... generated at build time from a small, independently testable table
//! generator"). The generator itself lives in `src/tables/tablegen.rs` and is
//! shared verbatim with the crate (via `include!`) so it can also be unit
//! tested in isolation.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

include!("src/tables/tablegen.rs");

fn write_read_table(out: &mut String, name: &str, big_endian: bool) {
    let table = build_read_table(big_endian);
    writeln!(out, "pub(crate) static {name}: [[ReadEntry; 8]; 512] = [").unwrap();
    for row in &table {
        write!(out, "    [").unwrap();
        for entry in row {
            write!(
                out,
                "ReadEntry {{ new_state: {}, produced_bits: {}, produced_value: {} }}, ",
                entry.new_state, entry.produced_bits, entry.produced_value
            )
            .unwrap();
        }
        writeln!(out, "],").unwrap();
    }
    writeln!(out, "];").unwrap();
}

fn write_unary_table(out: &mut String, name: &str, big_endian: bool) {
    let table = build_unary_table(big_endian);
    writeln!(out, "pub(crate) static {name}: [[UnaryEntry; 2]; 512] = [").unwrap();
    for row in &table {
        write!(out, "    [").unwrap();
        for entry in row {
            write!(
                out,
                "UnaryEntry {{ continues: {}, increment: {}, new_state: {} }}, ",
                entry.continues, entry.increment, entry.new_state
            )
            .unwrap();
        }
        writeln!(out, "],").unwrap();
    }
    writeln!(out, "];").unwrap();
}

fn write_unread_table(out: &mut String, name: &str, big_endian: bool) {
    let table = build_unread_table(big_endian);
    writeln!(out, "pub(crate) static {name}: [[UnreadEntry; 2]; 512] = [").unwrap();
    for row in &table {
        write!(out, "    [").unwrap();
        for entry in row {
            write!(
                out,
                "UnreadEntry {{ limit_reached: {}, new_state: {} }}, ",
                entry.limit_reached, entry.new_state
            )
            .unwrap();
        }
        writeln!(out, "],").unwrap();
    }
    writeln!(out, "];").unwrap();
}

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR set by cargo");
    let mut out = String::new();

    write_read_table(&mut out, "READ_BITS_TABLE_BE", true);
    write_read_table(&mut out, "READ_BITS_TABLE_LE", false);
    write_unary_table(&mut out, "UNARY_TABLE_BE", true);
    write_unary_table(&mut out, "UNARY_TABLE_LE", false);
    write_unread_table(&mut out, "UNREAD_TABLE_BE", true);
    write_unread_table(&mut out, "UNREAD_TABLE_LE", false);

    let dest = Path::new(&out_dir).join("bit_tables.rs");
    fs::write(&dest, out).expect("write generated bit tables");

    println!("cargo:rerun-if-changed=src/tables/tablegen.rs");
}
