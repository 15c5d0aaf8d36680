#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use diffsite::genomics::{parse_cigar, MemorySource, RecordSource};
use diffsite::{AlignmentRecord, ParallelPileup, Pileup, Strand};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("DIFFSITE_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set DIFFSITE_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Record on `chr1` with a uniform base quality.
pub fn record(pos: u32, cigar: &str, sequence: &[u8], quality: u8) -> AlignmentRecord {
    AlignmentRecord::new(
        "chr1",
        pos,
        60,
        parse_cigar(cigar).expect("valid CIGAR"),
        sequence.to_vec(),
        vec![quality; sequence.len()],
        false,
    )
}

/// `depth` identical full-match reads of `base` starting at `pos`.
pub fn uniform_reads(contig: &str, pos: u32, len: usize, base: u8, depth: usize) -> Vec<AlignmentRecord> {
    (0..depth)
        .map(|_| {
            AlignmentRecord::new(
                contig,
                pos,
                60,
                parse_cigar(&format!("{len}M")).expect("valid CIGAR"),
                vec![base; len],
                vec![30; len],
                false,
            )
        })
        .collect()
}

pub fn source(records: Vec<AlignmentRecord>) -> Box<dyn RecordSource> {
    Box::new(MemorySource::new(records))
}

/// `replicates` pileups, each with `depth` observations of `base` at q30.
pub fn group(base: usize, replicates: usize, depth: usize) -> Vec<Pileup> {
    (0..replicates)
        .map(|_| Pileup::from_observations("chr1", 42, Strand::Unknown, 4, &vec![(base, 30); depth]))
        .collect()
}

pub fn site(a: Vec<Pileup>, b: Vec<Pileup>) -> ParallelPileup {
    ParallelPileup::new(Arc::from("chr1"), 42, Strand::Unknown, Strand::Unknown, a, b)
}
