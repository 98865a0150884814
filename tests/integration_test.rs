//! End-to-end write → reopen → read coverage of the on-disk format.

use tempfile::tempdir;
use vibecol::{
    AggregateOptions, ColumnReader, ColumnWriter, Encoding, SortingWriter, WriterOptions,
    PAGE_SIZE,
};

const ALL_MODES: [Encoding; 8] = [
    Encoding::Raw,
    Encoding::DeltaId,
    Encoding::DeltaValue,
    Encoding::DeltaBoth,
    Encoding::VarInt,
    Encoding::VarIntId,
    Encoding::VarIntValue,
    Encoding::VarIntBoth,
];

#[test]
fn single_block_raw_roundtrip_and_aggregate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1.vcol");

    let ids: Vec<u64> = vec![1, 5, 10, 15, 20, 25, 30, 35, 40, 45];
    let values: Vec<i64> = vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
    let mut w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
    w.write_block(&ids, &values).unwrap();
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    assert_eq!(reader.block_count(), 1);
    assert_eq!(reader.version(), 1);
    assert_eq!(reader.encoding(), Encoding::Raw);
    assert!(!reader.is_varint_encoded());

    let (got_ids, got_values) = reader.get_pairs(0).unwrap();
    assert_eq!(got_ids, ids);
    assert_eq!(got_values, values);

    let agg = reader.aggregate(&AggregateOptions::default()).unwrap();
    assert_eq!(agg.count, 10);
    assert_eq!(agg.min, 100);
    assert_eq!(agg.max, 1000);
    assert_eq!(agg.sum, 5500);
    assert_eq!(agg.avg, 550.0);
}

#[test]
fn multi_block_raw_roundtrip_and_aggregate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s2.vcol");

    let ids1: Vec<u64> = vec![1, 2, 3, 4, 5];
    let values1: Vec<i64> = vec![10, 20, 30, 40, 50];
    let ids2: Vec<u64> = vec![6, 7, 8, 9, 10];
    let values2: Vec<i64> = vec![60, 70, 80, 90, 100];

    let mut w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
    w.write_block(&ids1, &values1).unwrap();
    w.write_block(&ids2, &values2).unwrap();
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    assert_eq!(reader.block_count(), 2);
    assert_eq!(reader.get_pairs(0).unwrap(), (ids1, values1));
    assert_eq!(reader.get_pairs(1).unwrap(), (ids2, values2));

    let agg = reader.aggregate(&AggregateOptions::default()).unwrap();
    assert_eq!(agg.count, 10);
    assert_eq!(agg.min, 10);
    assert_eq!(agg.max, 100);
    assert_eq!(agg.sum, 550);
    assert_eq!(agg.avg, 55.0);
}

#[test]
fn varint_file_is_less_than_half_the_raw_size() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("s3-raw.vcol");
    let varint_path = dir.path().join("s3-varint.vcol");

    let ids: Vec<u64> = (1..=100_000).collect();
    let values: Vec<i64> = ids.iter().map(|id| (id % 100) as i64).collect();

    for (path, encoding) in [(&raw_path, Encoding::Raw), (&varint_path, Encoding::VarIntBoth)] {
        let opts = WriterOptions { encoding, ..Default::default() };
        let mut w = SortingWriter::create(path, opts).unwrap();
        w.write(&ids, &values).unwrap();
        w.close().unwrap();
    }

    let raw_size = std::fs::metadata(&raw_path).unwrap().len();
    let varint_size = std::fs::metadata(&varint_path).unwrap().len();
    assert!(
        varint_size * 2 < raw_size,
        "varint file {varint_size} B should be under half of raw {raw_size} B"
    );

    // Same content either way.
    let reader = ColumnReader::open(&varint_path).unwrap();
    assert!(reader.is_varint_encoded());
    let total: u64 = reader.footer().iter().map(|e| e.count as u64).sum();
    assert_eq!(total, 100_000);
    let agg = reader.aggregate(&AggregateOptions::default()).unwrap();
    let expected_sum: i64 = values.iter().sum();
    assert_eq!(agg.sum, expected_sum);
}

#[test]
fn block_roundtrip_every_encoding_mode() {
    let dir = tempdir().unwrap();
    let ids: Vec<u64> = vec![3, 4, 10, 1_000, 50_000, 1 << 40, u64::MAX - 1];
    let values: Vec<i64> = vec![-1_000_000, 0, 1, i64::MAX, i64::MIN, 7, -7];

    for mode in ALL_MODES {
        let path = dir.path().join(format!("mode{}.vcol", mode as u32));
        let opts = WriterOptions { encoding: mode, ..Default::default() };
        let mut w = ColumnWriter::create(&path, opts).unwrap();
        w.write_block(&ids, &values).unwrap();
        w.finalize_and_close().unwrap();

        let reader = ColumnReader::open(&path).unwrap();
        assert_eq!(reader.encoding(), mode);
        let (got_ids, got_values) = reader.get_pairs(0).unwrap();
        assert_eq!(got_ids, ids, "{mode:?}");
        assert_eq!(got_values, values, "{mode:?}");
    }
}

#[test]
fn blocks_after_the_first_are_page_aligned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("aligned.vcol");

    let mut w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
    for b in 0u64..6 {
        let ids: Vec<u64> = (b * 100 + 1..=b * 100 + 50).collect();
        let values: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
        w.write_block(&ids, &values).unwrap();
    }
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    let footer = reader.footer();
    assert_eq!(footer[0].block_offset, 64, "first block sits right after the header");
    for (i, entry) in footer.iter().enumerate().skip(1) {
        assert_eq!(entry.block_offset % PAGE_SIZE, 0, "block {i} misaligned");
    }
}

#[test]
fn global_bitmap_is_exactly_the_written_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bitmap.vcol");

    let mut w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
    w.write_block(&[1, 5, 9], &[1, 1, 1]).unwrap();
    w.write_block(&[5, 100, 1 << 40], &[2, 2, 2]).unwrap(); // 5 repeats across blocks
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    let bitmap = reader.get_global_id_bitmap().unwrap();
    for id in [1u64, 5, 9, 100, 1 << 40] {
        assert!(bitmap.contains(id), "missing id {id}");
    }
    for id in [0u64, 2, 6, 99, 101, (1 << 40) + 1] {
        assert!(!bitmap.contains(id), "unexpected id {id}");
    }
    // Distinct count: 5 repeats, so 5 not 6.
    assert_eq!(bitmap.len(), 5);
}

#[test]
fn duplicate_ids_across_blocks_are_double_counted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dups.vcol");

    let mut w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
    w.write_block(&[1, 2], &[10, 20]).unwrap();
    w.write_block(&[2, 3], &[200, 30]).unwrap();
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    let agg = reader.aggregate(&AggregateOptions::default()).unwrap();
    // Append-only column model: id 2 contributes twice.
    assert_eq!(agg.count, 4);
    assert_eq!(agg.sum, 10 + 20 + 200 + 30);
    assert_eq!(reader.get_global_id_bitmap().unwrap().len(), 3);
}

#[test]
fn update_overlay_with_deny_bitmap() {
    // File A holds ids 1..=10; file B overrides ids {5,6,7} and appends
    // {11..=15}. Aggregating A with B's global bitmap as a deny list, plus
    // B unfiltered, yields the overlaid column.
    let dir = tempdir().unwrap();
    let path_a = dir.path().join("base.vcol");
    let path_b = dir.path().join("overlay.vcol");

    let ids_a: Vec<u64> = (1..=10).collect();
    let values_a: Vec<i64> = ids_a.iter().map(|&id| id as i64 * 10).collect();
    let mut w = ColumnWriter::create(&path_a, WriterOptions::default()).unwrap();
    w.write_block(&ids_a, &values_a).unwrap();
    w.finalize_and_close().unwrap();

    let ids_b: Vec<u64> = vec![5, 6, 7, 11, 12, 13, 14, 15];
    let values_b: Vec<i64> = vec![500, 600, 700, 110, 120, 130, 140, 150];
    let mut w = ColumnWriter::create(&path_b, WriterOptions::default()).unwrap();
    w.write_block(&ids_b, &values_b).unwrap();
    w.finalize_and_close().unwrap();

    let reader_a = ColumnReader::open(&path_a).unwrap();
    let reader_b = ColumnReader::open(&path_b).unwrap();

    let overridden = reader_b.get_global_id_bitmap().unwrap();
    let agg_a = reader_a
        .aggregate(&AggregateOptions { deny_filter: Some(overridden), ..Default::default() })
        .unwrap();
    let agg_b = reader_b.aggregate(&AggregateOptions::default()).unwrap();

    // A keeps {1,2,3,4,8,9,10}: sum 10+20+30+40+80+90+100 = 370.
    assert_eq!(agg_a.count, 7);
    assert_eq!(agg_a.sum, 370);

    let count = agg_a.count + agg_b.count;
    let sum = agg_a.sum.wrapping_add(agg_b.sum);
    let min = agg_a.min.min(agg_b.min);
    let max = agg_a.max.max(agg_b.max);
    assert_eq!(count, 15);
    assert_eq!(min, 10);
    assert_eq!(max, 700);
    assert_eq!(sum, 370 + 500 + 600 + 700 + 110 + 120 + 130 + 140 + 150);
    let avg = sum as f64 / count as f64;
    assert_eq!(avg, 2820.0 / 15.0);
}

#[test]
fn reopen_preserves_header_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.vcol");
    let opts = WriterOptions { encoding: Encoding::VarIntBoth, block_size_target: 8192 };
    let mut w = ColumnWriter::create(&path, opts).unwrap();
    w.write_block(&[1, 2, 3], &[-1, 0, 1]).unwrap();
    w.finalize_and_close().unwrap();

    let reader = ColumnReader::open(&path).unwrap();
    assert_eq!(reader.block_size_target(), 8192);
    assert_eq!(reader.encoding(), Encoding::VarIntBoth);
    assert!(reader.creation_time() > 0);
    let (bitmap_offset, bitmap_size) = reader.bitmap_location();
    assert!(bitmap_offset >= 64);
    assert!(bitmap_size > 4);
    reader.close().unwrap();
}
