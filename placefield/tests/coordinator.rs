use placefield::{
    Error, ErrorKind,
    coordinator::{
        Coordinator, CoordinatorConfig, RenderParameters, Status,
    },
    expr::Expression,
    render::{GridRequest, GridSize, Sampler},
};
use std::time::{Duration, Instant};

/// Sleeps for `f(0, 0)` milliseconds, then reports that value
fn sleepy(s: &Sampler, r: &GridRequest) -> Result<String, Error> {
    let ms = s.sample(0.0, 0.0)?;
    std::thread::sleep(Duration::from_millis(ms as u64));
    Ok(format!("{}:{ms}", r.place))
}

fn params(text: &str, max_place: u32) -> RenderParameters {
    RenderParameters {
        expression: Expression::new(text),
        grid: GridSize::new(8, 4),
        max_place,
        ..Default::default()
    }
}

fn unthrottled() -> CoordinatorConfig {
    CoordinatorConfig {
        min_dispatch_interval: Duration::ZERO,
        ..Default::default()
    }
}

/// Returns the generation of a successful status
fn ready(c: &Coordinator) -> Option<u64> {
    match c.status() {
        Status::Ready(g) => Some(g.get()),
        _ => None,
    }
}

/// Polls until no jobs remain and no workers are alive
fn drain(c: &mut Coordinator) {
    let start = Instant::now();
    loop {
        c.poll(Instant::now());
        if c.jobs_in_flight() == 0 && c.live_contexts() == 0 && !c.is_dirty() {
            return;
        }
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "coordinator never went idle"
        );
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn newer_generation_wins_when_older_finishes_last() {
    let mut c = Coordinator::with_params(unthrottled(), sleepy, params("300", 1));
    c.poll(Instant::now());
    assert_eq!(c.latest_generation().map(|g| g.get()), Some(1));

    c.set_expression(Expression::new("10"));
    c.poll(Instant::now());
    assert_eq!(c.latest_generation().map(|g| g.get()), Some(2));

    drain(&mut c);
    assert_eq!(ready(&c), Some(2));
    let (g, r) = c.results().unwrap();
    assert_eq!(g.get(), 2);
    assert_eq!(r.get(1), Some("1:10"));
}

#[test]
fn older_generation_is_discarded_when_it_finishes_first() {
    let mut c = Coordinator::with_params(unthrottled(), sleepy, params("80", 1));
    c.poll(Instant::now());
    c.set_expression(Expression::new("250"));
    c.poll(Instant::now());

    let start = Instant::now();
    while c.jobs_in_flight() > 0 {
        c.poll(Instant::now());
        // Generation 1 must never be published once 2 has been dispatched
        if let Some((g, _)) = c.results() {
            assert_eq!(g.get(), 2);
        }
        assert!(start.elapsed() < Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(ready(&c), Some(2));
    assert_eq!(c.results().unwrap().1.get(1), Some("1:250"));
}

#[test]
fn result_set_length_matches_max_place() {
    let mut c = Coordinator::with_params(unthrottled(), sleepy, params("0", 1));
    for m in 1..=12 {
        c.set_max_place(m);
        drain(&mut c);
        let (_, r) = c.results().unwrap();
        assert_eq!(r.len(), m as usize);
        assert_eq!(r.get(m), Some(format!("{m}:0").as_str()));
    }
}

#[test]
fn runaway_sum_times_out_and_is_torn_down() {
    let config = CoordinatorConfig {
        deadline: Duration::from_millis(100),
        ..unthrottled()
    };
    let mut c = Coordinator::with_params(
        config,
        sleepy,
        params("sum(i, 0, 1e15, i) * 0", 3),
    );
    drain(&mut c);
    let Status::TimedOut(g, e) = c.status() else {
        panic!("expected a timeout, got {:?}", c.status());
    };
    assert_eq!(g.get(), 1);
    assert_eq!(e, &Error::Timeout(Duration::from_millis(100)));
    assert_eq!(e.kind(), ErrorKind::Timeout);
    assert!(!e.is_expression_fault());
    assert_eq!(c.live_contexts(), 0);

    // The next generation runs normally
    c.set_expression(Expression::new("1"));
    drain(&mut c);
    assert_eq!(ready(&c), Some(2));
}

#[test]
fn syntax_error_commits_without_a_worker() {
    let mut c = Coordinator::with_params(unthrottled(), sleepy, params("x +* y", 3));
    assert!(c.poll(Instant::now()));
    assert_eq!(c.jobs_in_flight(), 0);
    assert_eq!(c.live_contexts(), 0);
    let Status::Invalid(_, e) = c.status() else {
        panic!("expected invalid status, got {:?}", c.status());
    };
    assert_eq!(e.kind(), ErrorKind::Syntax);
    assert!(e.is_expression_fault());
}

#[test]
fn long_chains_are_rejected_without_a_worker() {
    let chain = vec!["x"; 100_000].join(" + ");
    let args = format!("max({})", vec!["x"; 100_000].join(", "));
    let mut c = Coordinator::with_params(unthrottled(), sleepy, params(&chain, 3));
    for (i, text) in [&chain, &args].into_iter().enumerate() {
        if i > 0 {
            c.set_expression(Expression::new(text));
        }
        assert!(c.poll(Instant::now()));
        assert_eq!(c.jobs_in_flight(), 0);
        assert_eq!(c.live_contexts(), 0);
        let Status::Invalid(_, e) = c.status() else {
            panic!("expected invalid status, got {:?}", c.status());
        };
        assert_eq!(e.kind(), ErrorKind::Syntax);
    }

    // A chain within budget still renders
    let ok = vec!["0"; 200].join(" + ");
    c.set_expression(Expression::new(&ok));
    drain(&mut c);
    assert_eq!(ready(&c), Some(3));
    assert_eq!(c.results().unwrap().1.get(2), Some("2:0"));
}

#[test]
fn superseded_jobs_are_cancelled() {
    let mut c = Coordinator::with_params(
        unthrottled(),
        sleepy,
        params("sum(i, 0, 1e15, i) * 0", 1),
    );
    c.poll(Instant::now());
    c.set_expression(Expression::new("0"));
    c.poll(Instant::now());

    // The runaway generation stops long before its two second deadline
    let start = Instant::now();
    drain(&mut c);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(ready(&c), Some(2));
}
