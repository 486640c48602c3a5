use std::sync::Arc;

use lamina_column::{
    BLOCK_CAPACITY, Column, ColumnBlock, ColumnBlockHolder, ColumnDelta, ColumnReader,
    ColumnSchema, ColumnType, DeltaIndex, RowId, reader::Value, rowid::from_parts,
};
use xxhash_rust::xxh3::xxh3_64;

fn block_i64(values: &[i64], null_rows: &[usize]) -> Arc<ColumnBlock> {
    let mut block = ColumnBlock::new();
    block.alloc(values.len(), 8).unwrap();
    block.data_mut().typed_data_mut::<i64>().copy_from_slice(values);
    for &i in null_rows {
        block.set_null(i).unwrap();
    }
    Arc::new(block)
}

fn full_block_i64(f: impl Fn(usize) -> i64) -> Arc<ColumnBlock> {
    let mut block = ColumnBlock::new();
    block.alloc(BLOCK_CAPACITY, 8).unwrap();
    for (i, v) in block.data_mut().typed_data_mut::<i64>().iter_mut().enumerate() {
        *v = f(i);
    }
    Arc::new(block)
}

/// Builds a delta overriding `rows`, which must be ascending by row id;
/// `None` marks the override null.
fn delta_i64(version: u64, rows: &[(RowId, Option<i64>)]) -> Arc<ColumnDelta> {
    let rids: Vec<RowId> = rows.iter().map(|r| r.0).collect();
    let with_nulls = rows.iter().any(|r| r.1.is_none());
    let index = Arc::new(DeltaIndex::from_rows(&rids).unwrap());
    let mut delta = ColumnDelta::alloc(version, index, 8, with_nulls).unwrap();
    for (pos, (_, value)) in rows.iter().enumerate() {
        match value {
            Some(v) => delta.data_mut().typed_data_mut::<i64>()[pos] = *v,
            None => delta.set_null(pos as u32).unwrap(),
        }
    }
    Arc::new(delta)
}

fn column_i64(
    nullable: bool,
    base_version: u64,
    blocks: Vec<Arc<ColumnBlock>>,
    deltas: Vec<Arc<ColumnDelta>>,
) -> Column {
    let schema = ColumnSchema::new(1, "v", ColumnType::Int64, nullable, false).unwrap();
    let mut column = Column::new(schema, ColumnType::Int64, base_version).unwrap();
    for block in blocks {
        column.append_base_block(block).unwrap();
    }
    for delta in deltas {
        column.append_delta(delta).unwrap();
    }
    column
}

#[test]
fn test_point_reads_newest_delta_wins() {
    let column = column_i64(
        true,
        1,
        vec![block_i64(&[10, 20, 30], &[])],
        vec![
            delta_i64(2, &[(1, Some(99))]),
            delta_i64(3, &[(1, Some(42)), (2, None)]),
        ],
    );

    let reader = column.read::<i64, true, i64>(3).unwrap();
    assert_eq!(reader.get(0).copied(), Some(10));
    assert_eq!(reader.get(1).copied(), Some(42));
    assert_eq!(reader.get(2), None);

    let mut holder = ColumnBlockHolder::new();
    reader.get_block(3, 0, &mut holder).unwrap();
    assert!(holder.is_owned());
    let cb = holder.get();
    assert_eq!(cb.data().typed_data::<i64>()[0], 10);
    assert_eq!(cb.data().typed_data::<i64>()[1], 42);
    assert!(!cb.is_null(0));
    assert!(!cb.is_null(1));
    assert!(cb.is_null(2));

    // An older snapshot sees only the first delta.
    let reader = column.read::<i64, true, i64>(2).unwrap();
    assert_eq!(reader.get(1).copied(), Some(99));
    assert_eq!(reader.get(2).copied(), Some(30));

    // The base snapshot sees no deltas at all.
    let reader = column.read::<i64, true, i64>(1).unwrap();
    assert_eq!(reader.get(1).copied(), Some(20));
    assert_eq!(reader.num_deltas(), 0);
}

#[test]
fn test_untouched_block_passes_through_borrowed() {
    let column = column_i64(
        false,
        1,
        vec![full_block_i64(|i| i as i64), block_i64(&[500, 501, 502], &[])],
        vec![delta_i64(2, &[(from_parts(1, 1), Some(-7))])],
    );
    let reader = column.read::<i64, false, i64>(2).unwrap();

    let mut holder = ColumnBlockHolder::new();
    reader.get_block(BLOCK_CAPACITY, 0, &mut holder).unwrap();
    assert!(!holder.is_owned());
    // The holder references the base block itself, no copy was made.
    assert!(std::ptr::eq(holder.get(), column.base_blocks()[0].as_ref()));

    reader.get_block(3, 1, &mut holder).unwrap();
    assert!(holder.is_owned());
    assert_eq!(holder.get().data().typed_data::<i64>()[..3], [500, -7, 502]);
}

#[test]
fn test_row_ids_address_blocks() {
    let column = column_i64(
        false,
        1,
        vec![full_block_i64(|i| i as i64 * 3), block_i64(&[-1, -2, -3], &[])],
        vec![],
    );
    let reader = column.read::<i64, false, i64>(1).unwrap();

    assert_eq!(reader.get(0).copied(), Some(0));
    assert_eq!(reader.get(65535).copied(), Some(65535 * 3));
    assert_eq!(reader.get(from_parts(1, 0)).copied(), Some(-1));
    assert_eq!(reader.get(from_parts(1, 2)).copied(), Some(-3));
}

#[test]
fn test_holder_reuse_across_calls() {
    let column = column_i64(
        false,
        1,
        vec![
            full_block_i64(|i| i as i64),
            block_i64(&[100, 200, 300, 400], &[]),
        ],
        vec![
            delta_i64(2, &[(3, Some(-3)), (from_parts(1, 0), Some(111))]),
            delta_i64(3, &[(3, Some(-4)), (from_parts(1, 3), Some(444))]),
        ],
    );
    let reader = column.read::<i64, false, i64>(3).unwrap();
    let mut holder = ColumnBlockHolder::new();

    reader.get_block(BLOCK_CAPACITY, 0, &mut holder).unwrap();
    assert!(holder.is_owned());
    let ptr = holder.get().data().as_ptr();
    assert_eq!(holder.get().data().typed_data::<i64>()[3], -4);

    // The smaller second block merges into the same allocation.
    reader.get_block(4, 1, &mut holder).unwrap();
    assert!(holder.is_owned());
    assert_eq!(holder.get().data().as_ptr(), ptr);
    assert_eq!(holder.get().data().typed_data::<i64>()[..4], [111, 200, 300, 444]);

    // And the merge stays correct when repeated.
    reader.get_block(BLOCK_CAPACITY, 0, &mut holder).unwrap();
    assert_eq!(holder.get().data().as_ptr(), ptr);
    let values = holder.get().data().typed_data::<i64>();
    assert_eq!(values[2], 2);
    assert_eq!(values[3], -4);
}

#[test]
fn test_delta_without_nulls_clears_base_null() {
    // Base marks row 1 null; a later delta overwrites it with a plain value
    // and carries no null buffer, so the row must come back non-null.
    let column = column_i64(
        true,
        1,
        vec![block_i64(&[10, 0, 30], &[1])],
        vec![delta_i64(2, &[(1, Some(77))])],
    );

    let reader = column.read::<i64, true, i64>(1).unwrap();
    assert_eq!(reader.get(1), None);

    let reader = column.read::<i64, true, i64>(2).unwrap();
    assert_eq!(reader.get(1).copied(), Some(77));

    let mut holder = ColumnBlockHolder::new();
    reader.get_block(3, 0, &mut holder).unwrap();
    let cb = holder.get();
    assert!(!cb.is_null(1));
    assert_eq!(cb.data().typed_data::<i64>()[1], 77);
    assert!(!cb.is_null(0));
    assert_eq!(cb.data().typed_data::<i64>()[..3], [10, 77, 30]);
}

#[test]
fn test_nullable_pass_through_keeps_base_nulls() {
    let column = column_i64(true, 1, vec![block_i64(&[1, 2, 3], &[2])], vec![]);
    let reader = column.read::<i64, true, i64>(1).unwrap();
    let mut holder = ColumnBlockHolder::new();
    reader.get_block(3, 0, &mut holder).unwrap();
    assert!(!holder.is_owned());
    assert!(holder.get().is_null(2));
    assert!(!holder.get().is_null(0));
}

#[test]
fn test_key_column_equals_and_hashcode() {
    let schema = ColumnSchema::new(0, "k", ColumnType::Int64, false, true).unwrap();
    let mut column = Column::new(schema, ColumnType::Int64, 1).unwrap();
    column.append_base_block(block_i64(&[10, 20, 30], &[])).unwrap();
    column.append_delta(delta_i64(2, &[(1, Some(42))])).unwrap();
    let reader = column.read::<i64, false, i64>(2).unwrap();

    let probe = [5i64, 42, 30];
    // Delta-resolved value.
    assert!(reader.equals(1, &probe, 1));
    assert!(!reader.equals(1, &probe, 0));
    // Base-resolved value.
    assert!(reader.equals(2, &probe, 2));
    assert!(!reader.equals(0, &probe, 2));

    assert_eq!(reader.hashcode(&probe, 1), xxh3_64(&42i64.to_ne_bytes()));
    assert_ne!(reader.hashcode(&probe, 0), reader.hashcode(&probe, 1));
}

#[test]
#[should_panic(expected = "only used for key columns")]
fn test_nullable_equals_is_fatal() {
    let column = column_i64(true, 1, vec![block_i64(&[1, 2, 3], &[])], vec![]);
    let reader = column.read::<i64, true, i64>(1).unwrap();
    reader.equals(0, &[1i64], 0);
}

#[test]
#[should_panic(expected = "only used for key columns")]
fn test_nullable_hashcode_is_fatal() {
    let column = column_i64(true, 1, vec![block_i64(&[1, 2, 3], &[])], vec![]);
    let reader = column.read::<i64, true, i64>(1).unwrap();
    reader.hashcode(&[1i64], 0);
}

#[test]
fn test_mixed_storage_type_reader() {
    // A column whose committed representation is narrower than its logical
    // type: values are stored as int32, compared as int64.
    let schema = ColumnSchema::new(2, "enc", ColumnType::Int64, false, false).unwrap();
    let mut column = Column::new(schema, ColumnType::Int32, 1).unwrap();
    let mut block = ColumnBlock::new();
    block.alloc(3, 4).unwrap();
    block
        .data_mut()
        .typed_data_mut::<i32>()
        .copy_from_slice(&[7, 8, 9]);
    column.append_base_block(Arc::new(block)).unwrap();

    let reader = column.read::<i64, false, i32>(1).unwrap();
    assert_eq!(reader.get(1).copied(), Some(8));

    // Hashing degenerates to a constant when the types differ.
    let probe = [7i64, 100];
    assert_eq!(reader.hashcode(&probe, 0), 0);
    assert_eq!(reader.hashcode(&probe, 1), 0);

    // The erased factory refuses mixed storage/logical columns.
    assert!(column.create_reader(1).is_err());
}

#[test]
fn test_reader_rejects_mismatched_instantiation() {
    let column = column_i64(false, 1, vec![block_i64(&[1, 2], &[])], vec![]);
    // Wrong storage width.
    assert!(column.read::<i32, false, i32>(1).is_err());
    // Wrong nullability.
    assert!(column.read::<i64, true, i64>(1).is_err());
    // Snapshot predating the base.
    assert!(column.read::<i64, false, i64>(0).is_err());
}

#[test]
fn test_describe_reports_versions() {
    let column = column_i64(
        false,
        5,
        vec![block_i64(&[1, 2, 3], &[])],
        vec![delta_i64(7, &[(0, Some(9))]), delta_i64(12, &[(1, Some(8))])],
    );
    let reader = column.read::<i64, false, i64>(9).unwrap();
    assert_eq!(reader.version(), 9);
    assert_eq!(reader.real_version(), 7);
    assert_eq!(reader.num_deltas(), 1);

    let s = reader.describe();
    assert!(s.contains("name=v"));
    assert!(s.contains("version=9(real=7) ndelta=1"), "{s}");
}

fn check_erased_type<T: Value>(ctype: ColumnType, values: [T; 3]) {
    let schema = ColumnSchema::new(1, "c", ctype, false, false).unwrap();
    let mut column = Column::new(schema, ctype, 1).unwrap();
    let mut block = ColumnBlock::new();
    block.alloc(3, ctype.fixed_size()).unwrap();
    block.data_mut().typed_data_mut::<T>().copy_from_slice(&values);
    column.append_base_block(Arc::new(block)).unwrap();

    let reader = column.create_reader(1).unwrap();
    for (i, v) in values.iter().enumerate() {
        assert_eq!(reader.get(i as RowId), Some(bytemuck::bytes_of(v)));
    }
    let probe: &[u8] = bytemuck::cast_slice(&values);
    assert!(reader.equals(0, probe, 0));
    assert!(!reader.equals(0, probe, 1));
    assert_eq!(reader.hashcode(probe, 2), xxh3_64(bytemuck::bytes_of(&values[2])));
}

#[test]
fn test_erased_readers_cover_all_types() {
    check_erased_type::<i8>(ColumnType::Int8, [1, -2, 3]);
    check_erased_type::<i16>(ColumnType::Int16, [100, -200, 300]);
    check_erased_type::<i32>(ColumnType::Int32, [1, 2, 3_000_000]);
    check_erased_type::<i64>(ColumnType::Int64, [-1, 0, i64::MAX]);
    check_erased_type::<i128>(ColumnType::Int128, [i128::MIN, 7, i128::MAX]);
    check_erased_type::<f32>(ColumnType::Float32, [1.5, -2.25, 3.5]);
    check_erased_type::<f64>(ColumnType::Float64, [0.125, -0.5, 1e300]);
}

#[test]
fn test_erased_nullable_get() {
    let column = column_i64(
        true,
        1,
        vec![block_i64(&[10, 20, 30], &[])],
        vec![delta_i64(2, &[(1, None)])],
    );
    let reader = column.create_reader(2).unwrap();
    assert_eq!(reader.get(0), Some(&10i64.to_ne_bytes()[..]));
    assert_eq!(reader.get(1), None);
    let mut holder = ColumnBlockHolder::new();
    reader.get_block(3, 0, &mut holder).unwrap();
    assert!(holder.get().is_null(1));
}

#[test]
fn test_randomized_reads_match_model() {
    fastrand::seed(0x1a3f5c);
    let second_len = 750;
    let total = BLOCK_CAPACITY + second_len;

    // Base content, every 97th row of block 0 null.
    let mut model: Vec<Option<i64>> = (0..total)
        .map(|i| {
            if i < BLOCK_CAPACITY && i % 97 == 0 {
                None
            } else {
                Some(i as i64 * 7 - 3)
            }
        })
        .collect();

    let block0 = {
        let mut block = ColumnBlock::new();
        block.alloc(BLOCK_CAPACITY, 8).unwrap();
        for (i, v) in block.data_mut().typed_data_mut::<i64>().iter_mut().enumerate() {
            *v = i as i64 * 7 - 3;
        }
        for i in (0..BLOCK_CAPACITY).step_by(97) {
            block.set_null(i).unwrap();
        }
        Arc::new(block)
    };
    let block1 = {
        let mut block = ColumnBlock::new();
        block.alloc(second_len, 8).unwrap();
        for (i, v) in block.data_mut().typed_data_mut::<i64>().iter_mut().enumerate() {
            *v = (BLOCK_CAPACITY + i) as i64 * 7 - 3;
        }
        Arc::new(block)
    };

    let index_of = |rid: RowId| -> usize {
        (rid >> 16) as usize * BLOCK_CAPACITY + (rid & 0xFFFF) as usize
    };
    let rid_of = |i: usize| -> RowId {
        from_parts((i / BLOCK_CAPACITY) as u32, (i % BLOCK_CAPACITY) as u32)
    };

    // Random delta chain at versions 2..=5.
    let mut delta_rows: Vec<(u64, Vec<(RowId, Option<i64>)>)> = Vec::new();
    for version in 2..=5u64 {
        let mut rows = Vec::new();
        let mut i = fastrand::usize(0..100);
        while i < total {
            let value = if fastrand::u8(..) % 5 == 0 {
                None
            } else {
                Some(fastrand::i64(-1_000_000..1_000_000))
            };
            rows.push((rid_of(i), value));
            i += fastrand::usize(1..500);
        }
        delta_rows.push((version, rows));
    }

    let column = column_i64(
        true,
        1,
        vec![block0, block1],
        delta_rows
            .iter()
            .map(|(version, rows)| delta_i64(*version, rows))
            .collect(),
    );

    let check = |model: &[Option<i64>], version: u64, real: u64| {
        let reader = column.read::<i64, true, i64>(version).unwrap();
        assert_eq!(reader.real_version(), real);

        for _ in 0..500 {
            let i = fastrand::usize(0..total);
            assert_eq!(reader.get(rid_of(i)).copied(), model[i], "rid index {i}");
        }

        let mut holder = ColumnBlockHolder::new();
        for (bid, nrows) in [(0, BLOCK_CAPACITY), (1, second_len)] {
            reader.get_block(nrows, bid, &mut holder).unwrap();
            let cb = holder.get();
            let values = cb.data().typed_data::<i64>();
            for i in 0..nrows {
                let expected = model[bid * BLOCK_CAPACITY + i];
                match expected {
                    Some(v) => {
                        assert!(!cb.is_null(i));
                        assert_eq!(values[i], v);
                    }
                    None => assert!(cb.is_null(i)),
                }
            }
        }
    };

    check(&model, 1, 1);
    for (version, rows) in &delta_rows {
        for (rid, value) in rows {
            model[index_of(*rid)] = *value;
        }
        check(&model, *version, *version);
    }
    // A snapshot past the chain end sees everything.
    check(&model, 1000, 5);
}
