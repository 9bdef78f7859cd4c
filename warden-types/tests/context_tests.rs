use std::time::Duration;
use tokio::time::Instant;
use warden_types::{CallContext, Interrupted};

// ── Construction ─────────────────────────────────────────────────

#[test]
fn background_has_no_deadline() {
    let ctx = CallContext::background();
    assert!(ctx.deadline().is_none());
    assert!(ctx.remaining().is_none());
}

#[tokio::test(start_paused = true)]
async fn timeout_only_tightens() {
    let ctx = CallContext::with_timeout(Duration::from_secs(5));
    let first = ctx.deadline().unwrap();

    let looser = ctx.clone().timeout(Duration::from_secs(60));
    assert_eq!(looser.deadline(), Some(first));

    let tighter = ctx.timeout(Duration::from_secs(1));
    assert!(tighter.deadline().unwrap() < first);
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_is_ignored() {
    let ctx = CallContext::background().timeout(Duration::MAX);
    assert!(ctx.deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn remaining_counts_down() {
    let ctx = CallContext::with_timeout(Duration::from_secs(10));
    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(ctx.remaining(), Some(Duration::from_secs(6)));
}

// ── check ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn check_reports_expired_deadline() {
    let ctx = CallContext::with_deadline(Instant::now());
    assert_eq!(ctx.check(), Err(Interrupted::DeadlineExceeded));
}

#[test]
fn check_reports_cancellation() {
    let (ctx, handle) = CallContext::cancellable();
    assert!(ctx.check().is_ok());
    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(ctx.check(), Err(Interrupted::Cancelled));
}

#[test]
fn clones_share_cancel_signal() {
    let (ctx, handle) = CallContext::cancellable();
    let clone = ctx.clone();
    handle.cancel();
    assert_eq!(clone.check(), Err(Interrupted::Cancelled));
}

// ── run ──────────────────────────────────────────────────────────

#[tokio::test]
async fn run_returns_output() {
    let ctx = CallContext::background();
    let out = ctx.run(async { 41 + 1 }).await;
    assert_eq!(out, Ok(42));
}

#[tokio::test(start_paused = true)]
async fn run_stops_at_deadline() {
    let ctx = CallContext::with_timeout(Duration::from_millis(50));
    let out = ctx.run(std::future::pending::<()>()).await;
    assert_eq!(out, Err(Interrupted::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_cancel() {
    let (ctx, handle) = CallContext::cancellable();
    let (out, ()) = tokio::join!(ctx.run(std::future::pending::<()>()), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
    });
    assert_eq!(out, Err(Interrupted::Cancelled));
}

#[tokio::test]
async fn run_refuses_already_cancelled_context() {
    let (ctx, handle) = CallContext::cancellable();
    handle.cancel();
    let out = ctx.run(async { 1 }).await;
    assert_eq!(out, Err(Interrupted::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_never_cancels() {
    let (ctx, handle) = CallContext::cancellable();
    drop(handle);
    let ctx = ctx.timeout(Duration::from_secs(1));
    let out = ctx.run(std::future::pending::<()>()).await;
    assert_eq!(out, Err(Interrupted::DeadlineExceeded));
}

#[test]
fn interrupted_display() {
    assert!(Interrupted::Cancelled.to_string().contains("cancelled"));
    assert!(Interrupted::DeadlineExceeded.to_string().contains("deadline"));
}
