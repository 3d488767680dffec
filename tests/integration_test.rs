// Integration tests for RVD
use rvd::{
    key, read_rvd, row, write_rvd, CoercionPath, DataType, Field, Interval, JoinType,
    PartitionInfo, RangePartitioner, Row, RowCollection, RowSchema, Rvd, RvdConfig, RvdContext,
    Sortedness, Value,
};
use std::sync::Arc;
use tempfile::TempDir;

fn ctx() -> RvdContext {
    RvdContext::new(RvdConfig {
        parallelism: Some(4),
        validate: true,
        ..RvdConfig::default()
    })
    .unwrap()
}

fn variant_schema(value_name: &str) -> Arc<RowSchema> {
    Arc::new(
        RowSchema::new(
            vec![
                Field::new("chrom", DataType::String),
                Field::new("pos", DataType::Int32),
                Field::new(value_name, DataType::String),
            ],
            2,
        )
        .unwrap(),
    )
}

fn int_schema() -> Arc<RowSchema> {
    Arc::new(
        RowSchema::new(
            vec![
                Field::new("k", DataType::Int32),
                Field::new("v", DataType::Int32),
            ],
            2,
        )
        .unwrap(),
    )
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|a, b| a.values().cmp(b.values()));
    rows
}

#[test]
fn test_zip_join_variants() {
    let ctx = ctx();
    let left = Rvd::from_partitions(
        &ctx,
        variant_schema("allele"),
        1,
        vec![
            vec![row!["chr1", 100, "A"], row!["chr1", 200, "B"]],
            vec![row!["chr2", 50, "C"]],
        ],
    )
    .unwrap();
    let right = Rvd::from_partitions(
        &ctx,
        variant_schema("allele"),
        1,
        vec![vec![row!["chr1", 100, "A"], row!["chr2", 50, "X"]]],
    )
    .unwrap();

    let zipped = left.ordered_zip_join(&ctx, &right, 2).unwrap();
    let records = zipped.collect();
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].key, key!["chr1", 100]);
    assert_eq!(records[0].left, Some(row!["chr1", 100, "A"]));
    assert_eq!(records[0].right, Some(row!["chr1", 100, "A"]));

    assert_eq!(records[1].key, key!["chr1", 200]);
    assert_eq!(records[1].left, Some(row!["chr1", 200, "B"]));
    assert_eq!(records[1].right, None);

    assert_eq!(records[2].key, key!["chr2", 50]);
    assert_eq!(records[2].left, Some(row!["chr2", 50, "C"]));
    assert_eq!(records[2].right, Some(row!["chr2", 50, "X"]));
}

#[test]
fn test_overlapping_tsorted_input_is_shuffled_into_order() {
    let ctx = ctx();
    let partitions = vec![
        vec![row![1, 5], row![1, 2], row![10, 0]],
        vec![row![5, 1], row![15, 3], row![15, 1]],
        vec![row![20, 1], row![25, 0]],
        vec![row![30, 2], row![30, 1], row![40, 0]],
    ];
    let all: Vec<Row> = partitions.iter().flatten().cloned().collect();

    let infos: Vec<PartitionInfo> = partitions
        .iter()
        .enumerate()
        .map(|(i, rows)| PartitionInfo::compute(i, rows, 2, 1, 20, 0))
        .collect();
    let worst = infos.iter().map(|info| info.sortedness).min().unwrap();
    assert_eq!(worst, Sortedness::TSorted);

    let (rvd, path) = Rvd::coerce_with_path(
        &ctx,
        int_schema(),
        1,
        RowCollection::new(partitions),
    )
    .unwrap();
    assert_eq!(path, CoercionPath::Shuffle);
    assert!(rvd.partitioner().is_strict());
    assert_eq!(
        rvd.partitioner().range(),
        Some(Interval::closed(key![1], key![40]))
    );

    for i in 0..rvd.num_partitions() {
        let info = PartitionInfo::compute(i, rvd.partition(i), 2, 1, 0, 0);
        assert_eq!(info.sortedness, Sortedness::KSorted);
    }
    assert_eq!(rvd.collect(), sorted(all));
}

#[test]
fn test_tsorted_input_is_sorted_locally() {
    let ctx = ctx();
    let partitions = vec![
        vec![row![1, 3], row![1, 1], row![5, 0]],
        vec![row![5, 7], row![5, 2], row![9, 0]],
    ];
    let all: Vec<Row> = partitions.iter().flatten().cloned().collect();

    let (rvd, path) = Rvd::coerce_with_path(
        &ctx,
        int_schema(),
        1,
        RowCollection::new(partitions),
    )
    .unwrap();
    assert_eq!(path, CoercionPath::LocalSort);
    assert!(rvd.partitioner().is_strict());
    assert_eq!(rvd.partitioner().key_len(), 1);
    assert_eq!(rvd.count_per_partition(), vec![5, 1]);
    assert_eq!(
        rvd.partition(0),
        &[row![1, 1], row![1, 3], row![5, 0], row![5, 2], row![5, 7]]
    );
    assert_eq!(rvd.partition(1), &[row![9, 0]]);

    for i in 0..rvd.num_partitions() {
        let info = PartitionInfo::compute(i, rvd.partition(i), 2, 1, 0, 0);
        assert_eq!(info.sortedness, Sortedness::KSorted);
    }
    assert_eq!(rvd.collect(), sorted(all));
    rvd.validate(&ctx).unwrap();
}

#[test]
fn test_touching_sorted_partitions_are_resliced() {
    let ctx = ctx();
    let schema = Arc::new(
        RowSchema::new(
            vec![
                Field::new("k", DataType::Int32),
                Field::new("v", DataType::Int32),
                Field::new("id", DataType::String),
            ],
            2,
        )
        .unwrap(),
    );
    let partitions = vec![
        vec![row![1, 0, "a"], row![5, 0, "b"]],
        vec![row![5, 0, "c"], row![5, 0, "d"]],
        vec![row![5, 0, "e"], row![9, 0, "f"]],
    ];
    let all: Vec<Row> = partitions.iter().flatten().cloned().collect();

    let (rvd, path) =
        Rvd::coerce_with_path(&ctx, schema, 2, RowCollection::new(partitions)).unwrap();
    assert_eq!(path, CoercionPath::LocalRepartition);
    assert!(rvd.partitioner().is_strict());
    assert_eq!(rvd.count_per_partition(), vec![5, 1]);
    // Source order is kept for rows sharing a key.
    assert_eq!(rvd.collect(), all);

    for i in 0..rvd.num_partitions() {
        let info = PartitionInfo::compute(i, rvd.partition(i), 2, 2, 0, 0);
        assert_eq!(info.sortedness, Sortedness::KSorted);
    }
    rvd.validate(&ctx).unwrap();
}

#[test]
fn test_coalesce_shortfall_is_reported() {
    let ctx = ctx();
    let schema = Arc::new(
        RowSchema::new(
            vec![
                Field::new("k", DataType::Int32),
                Field::new("v", DataType::Int32),
            ],
            1,
        )
        .unwrap(),
    );
    let mut bounds: Vec<Interval> = (0..9)
        .map(|i| Interval::half_open(key![i * 100], key![(i + 1) * 100]))
        .collect();
    bounds.push(Interval::closed(key![900], key![1000]));
    let partitioner = RangePartitioner::new(schema.key_type(), bounds).unwrap();

    let mut partitions: Vec<Vec<Row>> = vec![Vec::new(); 10];
    partitions[0] = (0..100).map(|k| row![k, k]).collect();
    partitions[9] = vec![row![950, 0]];
    let rvd = Rvd::new(&ctx, schema, partitioner, RowCollection::new(partitions)).unwrap();
    assert_eq!(rvd.num_partitions(), 10);

    let outcome = rvd.coalesce(&ctx, 3).unwrap();
    assert_eq!(outcome.rvd.num_partitions(), 2);
    assert_eq!(outcome.rvd.count_per_partition(), vec![100, 1]);
    let shortfall = outcome.shortfall.unwrap();
    assert_eq!(shortfall.requested, 3);
    assert_eq!(shortfall.achieved, 2);
    assert_eq!(outcome.rvd.collect(), rvd.collect());

    let naive = rvd.naive_coalesce(&ctx, 3).unwrap();
    assert_eq!(naive.count_per_partition(), vec![100, 0, 1]);
}

#[test]
fn test_coercion_is_idempotent() {
    let ctx = ctx();
    let rvd = Rvd::from_partitions(
        &ctx,
        int_schema(),
        1,
        vec![
            vec![row![7, 1], row![3, 2], row![9, 9]],
            vec![row![1, 1], row![12, 0]],
            vec![row![4, 4]],
        ],
    )
    .unwrap();

    let (again, path) = rvd.recoerce(&ctx).unwrap();
    assert_eq!(path, CoercionPath::AsIs);
    assert_eq!(again.partitioner(), rvd.partitioner());
    assert_eq!(again.collect(), rvd.collect());
}

#[test]
fn test_repartition_keeps_rows_in_covered_range() {
    let ctx = ctx();
    let schema = Arc::new(
        RowSchema::new(
            vec![
                Field::new("k", DataType::Int32),
                Field::new("name", DataType::String),
            ],
            1,
        )
        .unwrap(),
    );
    let partitions: Vec<Vec<Row>> = (0..5)
        .map(|p| (p * 10..p * 10 + 10).map(|k| row![k, format!("r{}", k)]).collect())
        .collect();
    let rvd = Rvd::from_partitions(&ctx, Arc::clone(&schema), 1, partitions).unwrap();

    let target = RangePartitioner::new(
        schema.key_type(),
        vec![
            Interval::half_open(key![10], key![20]),
            Interval::closed(key![20], key![35]),
        ],
    )
    .unwrap();
    let expected: Vec<Row> = rvd
        .collect()
        .into_iter()
        .filter(|r| matches!(r.get(0), Some(Value::Int32(k)) if (10..=35).contains(k)))
        .collect();

    for shuffle in [false, true] {
        let moved = rvd.repartition(&ctx, target.clone(), shuffle).unwrap();
        assert_eq!(moved.partitioner(), &target);
        assert_eq!(moved.count_per_partition(), vec![10, 16]);
        assert_eq!(moved.collect(), expected);
    }
}

#[test]
fn test_generated_partitioner_is_disjoint_cover() {
    let key_type = int_schema().key_type();
    let inputs = vec![
        Interval::closed(key![3, 0], key![8, 1]),
        Interval::closed(key![1, 5], key![5, 0]),
        Interval::closed(key![10, 0], key![12, 0]),
    ];
    let partitioner = RangePartitioner::generate(&key_type, 1, inputs.clone()).unwrap();
    assert_eq!(partitioner.key_len(), 1);
    assert!(RangePartitioner::is_valid_disjoint(partitioner.range_bounds()));
    assert_eq!(
        partitioner.range_bounds(),
        &[
            Interval::closed(key![1], key![8]),
            Interval::closed(key![10], key![12]),
        ]
    );
    for interval in inputs {
        let coarse = interval.coarsen(1);
        assert!(partitioner
            .range_bounds()
            .iter()
            .any(|b| b.contains_interval(&coarse)));
    }
}

#[test]
fn test_joins_end_to_end() {
    let ctx = ctx();
    let left = Rvd::from_partitions(
        &ctx,
        variant_schema("allele"),
        1,
        vec![
            vec![row!["chr1", 100, "A"], row!["chr1", 200, "B"]],
            vec![row!["chr2", 50, "C"], row!["chr2", 50, "D"]],
        ],
    )
    .unwrap();
    let right = Rvd::from_partitions(
        &ctx,
        variant_schema("gene"),
        1,
        vec![
            vec![row!["chr2", 50, "BRCA"]],
            vec![row!["chr1", 100, "TP53"], row!["chr3", 7, "EGFR"]],
        ],
    )
    .unwrap();

    let inner = left.ordered_join(&ctx, &right, 2, JoinType::Inner).unwrap();
    assert_eq!(inner.key_len(), 2);
    assert_eq!(
        inner.schema().fields().iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["chrom", "pos", "allele", "gene"]
    );
    assert_eq!(
        inner.collect(),
        vec![
            row!["chr1", 100, "A", "TP53"],
            row!["chr2", 50, "C", "BRCA"],
            row!["chr2", 50, "D", "BRCA"],
        ]
    );

    let outer = left.ordered_join(&ctx, &right, 2, JoinType::Outer).unwrap();
    assert_eq!(outer.count(), 5);
    assert_eq!(
        outer.collect().last(),
        Some(&Row::new(vec![
            Value::from("chr3"),
            Value::from(7),
            Value::Null,
            Value::from("EGFR"),
        ]))
    );

    let distinct = left
        .ordered_join_distinct(&ctx, &right, 2, JoinType::Left)
        .unwrap();
    assert_eq!(distinct.count(), 4);
    assert!(left
        .ordered_join_distinct(&ctx, &right, 2, JoinType::Outer)
        .is_err());
    assert!(left.ordered_join(&ctx, &right, 0, JoinType::Inner).is_err());
}

#[test]
fn test_storage_roundtrip() {
    let ctx = ctx();
    let dir = TempDir::new().unwrap();
    let rvd = Rvd::from_partitions(
        &ctx,
        variant_schema("allele"),
        1,
        vec![
            vec![row!["chr1", 100, "A"], row!["chr1", 200, "B"]],
            vec![row!["chr2", 50, "C"]],
        ],
    )
    .unwrap();

    let manifest = write_rvd(&ctx, &rvd, dir.path()).unwrap();
    assert_eq!(manifest.total_rows(), 3);
    assert_eq!(manifest.key, vec!["chrom".to_string(), "pos".to_string()]);
    assert!(dir.path().join("manifest.json").exists());

    let back = read_rvd(&ctx, dir.path()).unwrap();
    assert_eq!(back.schema(), rvd.schema());
    assert_eq!(back.partitioner(), rvd.partitioner());
    assert_eq!(back.collect(), rvd.collect());

    let coalesced = back.coalesce(&ctx, 1).unwrap();
    assert!(coalesced.shortfall.is_none());
    assert_eq!(coalesced.rvd.num_partitions(), 1);
}

#[test]
fn test_config_from_json() {
    let config = RvdConfig::from_json(r#"{"parallelism": 2, "seed": 7}"#).unwrap();
    assert_eq!(config.parallelism, Some(2));
    assert_eq!(config.seed, 7);
    assert!(RvdConfig::from_json(r#"{"workers": 2}"#).is_err());
    assert!(RvdContext::new(RvdConfig {
        parallelism: Some(0),
        ..RvdConfig::default()
    })
    .is_err());
}
