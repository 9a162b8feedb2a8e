use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailvault::parser::mbox::MboxParser;
use mailvault::parser::reader::MailboxReader;
use mailvault::store::attachments::AttachmentStore;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_split_mbox(c: &mut Criterion) {
    let fixture_path = fixture("simple.mbox");

    c.bench_function("split_simple_mbox", |b| {
        b.iter(|| {
            let parser = MboxParser::new(&fixture_path);
            let mut count = 0u64;
            parser
                .parse_file(&mut |_offset, _bytes| {
                    count += 1;
                    true
                })
                .unwrap();
            count
        })
    });
}

fn bench_read_mailbox(c: &mut Criterion) {
    let fixture_path = fixture("attachments.mbox");
    let data = std::fs::read(&fixture_path).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let store = AttachmentStore::new(tmp.path());
    let reader = MailboxReader::new(&store);

    c.bench_function("read_attachments_mbox", |b| {
        b.iter(|| reader.read(&fixture_path, &data).unwrap().len())
    });
}

criterion_group!(benches, bench_split_mbox, bench_read_mailbox);
criterion_main!(benches);
