use std::sync::Arc;

use crate::RuntimeContext;
use crate::test::mock::fake_primitives;

#[test]
fn test_uninstrumented_context() {
    let ctx = RuntimeContext::new(fake_primitives(2), None);
    assert!(!ctx.is_instrumented());
    assert!(ctx.op_durations().is_none());
    assert_eq!(ctx.primitives().len(), 2);
}

#[test]
fn test_instrumented_context_zeroes_durations() {
    let ctx = RuntimeContext::new(Arc::from([]), Some(4));
    assert!(ctx.is_instrumented());
    assert_eq!(ctx.op_durations(), Some(&[0i64; 4][..]));
}

#[test]
fn test_instrumented_without_ops() {
    let ctx = RuntimeContext::new(Arc::from([]), Some(0));
    assert!(ctx.is_instrumented());
    assert_eq!(ctx.op_durations(), Some(&[][..]));
}

#[test]
fn test_raw_context_exposes_same_resources() {
    let primitives = fake_primitives(3);
    let mut ctx = RuntimeContext::new(primitives.clone(), Some(2));
    let raw = ctx.raw_mut();
    assert_eq!(raw.primitives(), &primitives[..]);
    raw.op_durations_mut().unwrap()[1] = 42;
    assert_eq!(ctx.op_durations(), Some(&[0, 42][..]));
}

#[test]
fn test_drop_releases_primitives() {
    let primitives = fake_primitives(1);
    let ctx = RuntimeContext::new(primitives.clone(), Some(1));
    assert_eq!(Arc::strong_count(&primitives), 2);
    drop(ctx);
    assert_eq!(Arc::strong_count(&primitives), 1);
}
