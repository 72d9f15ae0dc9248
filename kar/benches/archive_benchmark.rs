//! Benchmarks for reads over a memory-mapped archive.

use std::hint::black_box;
use std::io::Read;

use criterion::{Criterion, criterion_group, criterion_main};
use kar::{Archive, ArchiveMetadata, Builder, FileSource};
use tempfile::NamedTempFile;

/// Build a sealed archive on disk with one entry per (name, size) pair.
fn build_archive(entries: &[(&str, usize)]) -> NamedTempFile {
    let builder = Builder::new(ArchiveMetadata {
        author: "bench".to_string(),
        date_created: 0,
        version: 1,
    })
    .unwrap();

    for &(name, size) in entries {
        let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        builder.add(name, body.as_slice()).unwrap();
    }

    let mut file = NamedTempFile::new().unwrap();
    builder.seal(file.as_file_mut()).unwrap();
    file
}

fn bench_read_all(c: &mut Criterion) {
    let file = build_archive(&[("assets/bricks_color.png", 512 * 1024)]);
    let archive = Archive::open(FileSource::open(file.path()).unwrap()).unwrap();

    c.bench_function("read_all_mmap_512k", |b| {
        b.iter(|| {
            let contents = archive.read_all(black_box("assets/bricks_color.png")).unwrap();
            black_box(contents);
        });
    });
}

fn bench_streamed_read(c: &mut Criterion) {
    let file = build_archive(&[("assets/bricks_color.png", 512 * 1024)]);
    let archive = Archive::open(FileSource::open(file.path()).unwrap()).unwrap();

    c.bench_function("streamed_read_mmap_512k", |b| {
        b.iter(|| {
            let entry = archive.lookup("assets/bricks_color.png").unwrap();
            let mut contents = vec![0u8; entry.size as usize];
            archive
                .open_entry("assets/bricks_color.png")
                .unwrap()
                .read_exact(&mut contents)
                .unwrap();
            black_box(contents);
        });
    });
}

fn bench_lookup(c: &mut Criterion) {
    let entries: Vec<(String, usize)> = (0..256)
        .map(|i| (format!("assets/entry-{i:03}"), 64))
        .collect();
    let borrowed: Vec<(&str, usize)> = entries.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    let file = build_archive(&borrowed);
    let archive = Archive::open(FileSource::open(file.path()).unwrap()).unwrap();

    c.bench_function("lookup_256_entries", |b| {
        b.iter(|| {
            let entry = archive.lookup(black_box("assets/entry-200")).unwrap();
            black_box(entry);
        });
    });
}

criterion_group!(benches, bench_read_all, bench_streamed_read, bench_lookup);
criterion_main!(benches);
