use std::thread;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use fieldcheck::{
    CompareOp, ConditionDescriptor, FieldConfig, RuleConfig, Services, SetValueOptions,
    ValidateOptions, ValidationManager, Value,
};

const FIELDS: usize = 20;

fn form() -> Vec<FieldConfig> {
    (0..FIELDS)
        .map(|i| {
            FieldConfig::property(format!("f{i}"))
                .validate_with(ConditionDescriptor::require())
                .rule(RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 1_i64)).code("MIN"))
        })
        .collect()
}

/// One simulated form session: fill every field, then validate the whole
/// form.
fn session(manager: &ValidationManager, round: i64) {
    for i in 0..FIELDS {
        let _ = manager
            .set_value_with(
                &format!("f{i}"),
                Some(Value::Int(round % 3)),
                SetValueOptions::validate(),
            )
            .unwrap();
    }
    let _ = manager.validate(&ValidateOptions::default());
}

fn bench_throughput(c: &mut Criterion) {
    let thread_counts = [1, 2, 4, 8];

    let mut group = c.benchmark_group("throughput");
    group.measurement_time(Duration::from_secs(5));

    for &threads in &thread_counts {
        let configs = form();

        group.bench_function(&format!("{threads}_threads"), |b| {
            b.iter_custom(|iters| {
                let per_thread = iters / threads as u64;
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        // Managers are single-threaded; each worker owns one.
                        let configs = configs.clone();
                        thread::spawn(move || {
                            let manager = ValidationManager::builder(Services::default())
                                .fields(configs)
                                .notify_delay(Duration::ZERO)
                                .build()
                                .unwrap();
                            let start = Instant::now();
                            for round in 0..per_thread {
                                session(&manager, round as i64);
                            }
                            start.elapsed()
                        })
                    })
                    .collect();

                let mut max_elapsed = Duration::ZERO;
                for h in handles {
                    let elapsed = h.join().unwrap();
                    if elapsed > max_elapsed {
                        max_elapsed = elapsed;
                    }
                }
                max_elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
