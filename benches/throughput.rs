use convoy::{Row, RowWriter, Strategy, WriterConfig};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::thread;

const ROWS_PER_PRODUCER: usize = 2_000;

fn contended_writes(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let row = Row::from(["A", "row", "in", "a", "CSV", "file"]);

    let mut group = c.benchmark_group("contended_writes");
    for producers in [1usize, 4, 16] {
        group.throughput(Throughput::Elements((producers * ROWS_PER_PRODUCER) as u64));

        for strategy in [Strategy::Task, Strategy::Locked] {
            let path = dir.path().join(format!("{}_{}.csv", strategy, producers));
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), producers),
                &producers,
                |b, &producers| {
                    b.iter(|| {
                        let writer = convoy::open_with(
                            &path,
                            WriterConfig::default().with_strategy(strategy),
                        )
                        .unwrap();
                        thread::scope(|s| {
                            for _ in 0..producers {
                                s.spawn(|| {
                                    for _ in 0..ROWS_PER_PRODUCER {
                                        writer.write(row.clone()).unwrap();
                                    }
                                });
                            }
                        });
                        writer.close().unwrap();
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, contended_writes);
criterion_main!(benches);
