// The validation toggle is process-wide, so it gets its own test binary.
use rvd::{
    key, row, set_validation, validation_enabled, DataType, Error, Field, Interval,
    RangePartitioner, RowCollection, RowSchema, Rvd, RvdConfig, RvdContext,
};
use std::sync::Arc;

#[test]
fn test_process_wide_toggle_read_at_each_construction() {
    let ctx = RvdContext::new(RvdConfig {
        parallelism: Some(1),
        validate: false,
        ..RvdConfig::default()
    })
    .unwrap();
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
    let partitioner =
        RangePartitioner::new(schema.key_type(), vec![Interval::closed(key![0], key![10])]).unwrap();
    let outside = || RowCollection::new(vec![vec![row![20, 0]]]);

    assert!(!validation_enabled());
    assert!(!ctx.should_validate());
    assert!(Rvd::new(&ctx, Arc::clone(&schema), partitioner.clone(), outside()).is_ok());

    set_validation(true);
    assert!(ctx.should_validate());
    let res = Rvd::new(&ctx, Arc::clone(&schema), partitioner.clone(), outside());
    assert!(matches!(res, Err(Error::OrderingViolation { partition: 0, .. })));

    set_validation(false);
    assert!(!ctx.should_validate());
    assert!(Rvd::new(&ctx, schema, partitioner, outside()).is_ok());
}
