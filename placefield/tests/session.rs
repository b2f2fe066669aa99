use placefield::{
    Error,
    coordinator::CoordinatorConfig,
    playback::{Field, Pointer},
    render::{GlyphCell, GridRequest, Sampler, Viewport},
    session::{Session, SessionConfig},
};
use std::time::{Duration, Instant};

/// Renders each place as `f(x_offset, y_offset)`, tagged with the place
fn echo(s: &Sampler, r: &GridRequest) -> Result<String, Error> {
    let v = s.sample(r.x_offset as f64, r.y_offset as f64)?;
    Ok(format!("{}|{v}|{}x{}", r.place, r.width, r.height))
}

fn session(config: SessionConfig) -> Session {
    let mut s = Session::new(config, echo);
    s.resize(Viewport::new(160.0, 60.0), GlyphCell::new(8.0, 6.0));
    s
}

/// Polls until nothing is pending or in flight
fn settle(s: &mut Session) {
    let start = Instant::now();
    loop {
        s.poll(Instant::now());
        let c = s.coordinator();
        if !c.is_dirty() && c.jobs_in_flight() == 0 {
            return;
        }
        assert!(start.elapsed() < Duration::from_secs(10), "never settled");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn place_selection_issues_no_jobs() {
    let mut s = session(SessionConfig::default());
    settle(&mut s);
    let jobs = s.coordinator().jobs_dispatched();
    assert_eq!(jobs, 1);
    assert_eq!(s.frame(), Some("6|0|20x10"));

    let t0 = Instant::now();
    s.play(t0);
    for i in 1..=20 {
        s.poll(t0 + Duration::from_millis(250 * i));
    }
    s.pause();
    for _ in 0..30 {
        s.step_forward();
        s.poll(Instant::now());
    }
    for _ in 0..7 {
        s.step_back();
    }
    assert_eq!(s.coordinator().jobs_dispatched(), jobs);
    assert!(s.frame().is_some());
}

#[test]
fn playback_wraps_through_every_place() {
    let mut s = session(SessionConfig {
        place: 9,
        ..Default::default()
    });
    settle(&mut s);
    let t0 = Instant::now();
    s.play(t0);
    let mut seen = vec![];
    for i in 1..=9 {
        assert!(s.poll(t0 + Duration::from_millis(250 * i)));
        seen.push(s.place());
    }
    assert_eq!(seen, (1..=9).collect::<Vec<_>>());
}

#[test]
fn drag_is_coalesced() {
    let mut s = session(SessionConfig::default());
    settle(&mut s);
    let before = s.coordinator().jobs_dispatched();

    // Ten moves within ~10 ms, polling after each
    let start = Instant::now();
    s.pointer_down(Pointer::new(0.0, 0.0));
    for i in 1..=10 {
        s.pointer_move(Pointer::new(10.0 * i as f64, 0.0));
        s.poll(Instant::now());
        std::thread::sleep(Duration::from_millis(1));
    }
    s.pointer_up(Pointer::new(100.0, 0.0));
    let during = s.coordinator().jobs_dispatched() - before;
    if start.elapsed() < Duration::from_millis(50) {
        assert!(during <= 1, "{during} jobs during a 10 ms drag");
    }
    assert!(during < 10);

    // The final position is eventually rendered
    settle(&mut s);
    assert_eq!(s.params().x_offset, 10);
    assert_eq!(s.frame(), Some("6|0|20x10"));
    s.set_expression("x + y");
    settle(&mut s);
    assert_eq!(s.frame(), Some("6|10|20x10"));
}

#[test]
fn invalid_expression_is_flagged_and_recovers() {
    let mut s = session(SessionConfig {
        coordinator: CoordinatorConfig {
            min_dispatch_interval: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    });
    s.set_expression("x +* y");
    settle(&mut s);
    assert!(s.is_expression_invalid());
    assert_eq!(s.frame(), None);

    s.set_expression("x + q");
    settle(&mut s);
    assert!(s.is_expression_invalid());
    assert_eq!(s.error(), Some(&Error::UnknownVariable("q".to_owned())));

    s.set_expression("2 * x + 1");
    settle(&mut s);
    assert!(!s.is_expression_invalid());
    assert!(!s.timed_out());
    assert_eq!(s.frame(), Some("6|1|20x10"));
}

#[test]
fn timeout_is_flagged() {
    let mut s = session(SessionConfig {
        coordinator: CoordinatorConfig {
            deadline: Duration::from_millis(50),
            min_dispatch_interval: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    });
    s.set_expression("sum(k, 0, 1e15, k * x)");
    settle(&mut s);
    assert!(s.timed_out());
    assert!(!s.is_expression_invalid());
    assert_eq!(s.error(), Some(&Error::Timeout(Duration::from_millis(50))));
}

#[test]
fn field_edits() {
    let mut s = session(SessionConfig::default());
    settle(&mut s);
    assert!(!s.set_field(Field::XOffset, "left"));
    assert!(!s.coordinator().is_dirty());

    assert!(s.set_field(Field::MaxPlace, "3"));
    assert_eq!(s.place(), 3);
    settle(&mut s);
    let (_, r) = s.coordinator().results().unwrap();
    assert_eq!(r.len(), 3);
    assert_eq!(s.frame(), Some("3|0|20x10"));
}
