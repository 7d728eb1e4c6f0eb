use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Client, Config, NoTls};
use ulid::Ulid;

struct Target {
    host: String,
    port: u16,
    password: String,
    /// Must be listed in the server's SLOTBOOK_STAFF_USERS.
    staff_user: String,
}

async fn connect(target: &Target, dbname: &str, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname(dbname)
        .user(user)
        .password(&target.password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// The `n`th Saturday from 2030-01-05.
fn saturday(n: u64) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(2030, 1, 5).expect("valid date");
    first + Days::new(7 * n)
}

/// A fresh dealership with one resource and one Saturday window.
async fn setup_dealership(target: &Target, capacity: u32) -> (String, Ulid, Ulid) {
    let dbname = format!("bench_{}", Ulid::new());
    let staff = connect(target, &dbname, &target.staff_user).await;
    let rid = Ulid::new();
    let wid = Ulid::new();
    staff
        .batch_execute(&format!("INSERT INTO resources (id, kind) VALUES ('{rid}', 'service_bay')"))
        .await
        .unwrap();
    staff
        .batch_execute(&format!(
            r#"INSERT INTO windows (id, weekday, start, "end", capacity) VALUES ('{wid}', 'sat', '09:00', '10:00', {capacity})"#
        ))
        .await
        .unwrap();
    (dbname, rid, wid)
}

fn booking_sql(rid: Ulid, wid: Ulid, date: NaiveDate) -> String {
    format!(
        "INSERT INTO bookings (id, resource_id, date, window_id) VALUES ('{}', '{rid}', '{date}', '{wid}')",
        Ulid::new()
    )
}

async fn phase1_sequential(target: &Target) {
    let (dbname, rid, wid) = setup_dealership(target, 10).await;
    let client = connect(target, &dbname, "bench-customer").await;

    let n = 2000u64;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();
    for i in 0..n {
        let t = Instant::now();
        client
            .batch_execute(&booking_sql(rid, wid, saturday(i / 10)))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    println!(
        "  {n} bookings in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("booking latency", &mut latencies);
}

/// Many customers race for one slot. Exactly `capacity` must win.
async fn phase2_race(target: &Target) {
    let capacity = 5;
    let contenders = 100;
    let (dbname, rid, wid) = setup_dealership(target, capacity).await;

    let won = Arc::new(AtomicUsize::new(0));
    let full = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..contenders {
        let client = connect(target, &dbname, &format!("customer-{i}")).await;
        let won = won.clone();
        let full = full.clone();
        handles.push(tokio::spawn(async move {
            match client.batch_execute(&booking_sql(rid, wid, saturday(0))).await {
                Ok(()) => won.fetch_add(1, Ordering::Relaxed),
                Err(e) if e.code().map(|c| c.code()) == Some("23P01") => full.fetch_add(1, Ordering::Relaxed),
                Err(e) => panic!("unexpected error: {e}"),
            };
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = won.load(Ordering::Relaxed);
    let full = full.load(Ordering::Relaxed);
    println!(
        "  {contenders} contenders for capacity {capacity}: {won} booked, {full} SLOT_FULL in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, capacity as usize, "capacity violated");
}

async fn phase3_read_under_load(target: &Target) {
    let (dbname, rid, wid) = setup_dealership(target, 1000).await;

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5u64 {
        let client = connect(target, &dbname, &format!("writer-{w}")).await;
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let _ = client.batch_execute(&booking_sql(rid, wid, saturday(1 + w * 1000 + i / 900))).await;
                i += 1;
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..10 {
        let client = connect(target, &dbname, &format!("reader-{r}")).await;
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(500);
            for i in 0..500u64 {
                let t = Instant::now();
                client
                    .simple_query(&format!(
                        "SELECT * FROM availability WHERE resource_id = '{rid}' AND date = '{}'",
                        saturday(1 + i % 10)
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("availability query", &mut all);
}

async fn phase4_connection_storm(target: &Arc<Target>) {
    let n_conns = 50;
    let ops_per_conn = 10;
    let success = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_conns {
        let target = target.clone();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let (dbname, rid, wid) = setup_dealership(&target, 10).await;
            let client = connect(&target, &dbname, "storm").await;
            for i in 0..ops_per_conn {
                client
                    .batch_execute(&booking_sql(rid, wid, saturday(i)))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }
    for h in handles {
        let _ = h.await;
    }
    println!(
        "  {n_conns} dealerships, {ops_per_conn} bookings each: {}/{n_conns} succeeded in {:.2}s",
        success.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
    let target = Arc::new(Target {
        host: env("SLOTBOOK_HOST", "127.0.0.1"),
        port: env("SLOTBOOK_PORT", "5433").parse().expect("invalid SLOTBOOK_PORT"),
        password: env("SLOTBOOK_PASSWORD", "slotbook"),
        staff_user: env("SLOTBOOK_BENCH_STAFF", "manager"),
    });

    println!("=== slotbook stress benchmark ===");
    println!("target: {}:{} (staff user {})\n", target.host, target.port, target.staff_user);

    println!("[phase 1] sequential bookings");
    phase1_sequential(&target).await;

    println!("\n[phase 2] race for one slot");
    phase2_race(&target).await;

    println!("\n[phase 3] availability latency under booking load");
    phase3_read_under_load(&target).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&target).await;

    println!("\n=== done ===");
}
