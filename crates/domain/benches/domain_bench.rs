use chrono::{TimeZone, Utc};
use common::ExecutionId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{BonusActivation, BonusStatus, FiscalCode, redeemed_bonus_message};

fn family(size: usize) -> BonusActivation {
    BonusActivation::new(
        "ABCDEFGHIJKL",
        BonusStatus::Active,
        (0..size).rev().map(|i| FiscalCode::new(format!("FISCAL{i:010}"))),
    )
}

fn bench_sorted_recipients(c: &mut Criterion) {
    let bonus = family(8);

    c.bench_function("bonus/sorted_recipients_8", |b| {
        b.iter(|| bonus.sorted_recipients());
    });
}

fn bench_redeem(c: &mut Criterion) {
    let bonus = family(4);
    let at = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
    let by = ExecutionId::new();

    c.bench_function("bonus/redeem", |b| {
        b.iter(|| bonus.redeem(at, by));
    });
}

fn bench_message(c: &mut Criterion) {
    let at = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();

    c.bench_function("bonus/redeemed_message", |b| {
        b.iter(|| redeemed_bonus_message(at));
    });
}

criterion_group!(benches, bench_sorted_recipients, bench_redeem, bench_message);
criterion_main!(benches);
