//! Drive a tracker, a button pad and an analog stick over the loopback backend
//! and print what a host would receive each frame.
//!
//! Usage: cargo run --example loopback
//! Set VRPN_ENABLED_DEVICES=Head to leave the other devices disconnected.

use std::time::{Duration, Instant};
use vrpn_input::{
    ConfigSection, Delivery, Hand, InputEvent, KeyDetails, LoopbackConnector, Registry, Settings,
};

const FRAME: Duration = Duration::from_millis(16);

fn sections() -> Vec<ConfigSection> {
    vec![
        ConfigSection::new("Head")
            .with("Type", "Tracker")
            .with("Address", "Tracker0@localhost")
            .with("Tracker", "(Id=0,Name=Head,Description=Head,PlayerId=0,Hand=Left)")
            .with("PositionOffset", "X=0,Y=0,Z=-1")
            .with("RotationOffset", "X=0,Y=0,Z=1,Angle=90")
            .with("TrackerUnitsToUE4Units", "100")
            .with("FlipZAxis", "false"),
        ConfigSection::new("Pad")
            .with("Type", "Button")
            .with("Address", "Button0@localhost")
            .with("Button", "(Id=0,Name=PadFire,Description=\"Fire button\")"),
        ConfigSection::new("Stick")
            .with("Type", "Analog")
            .with("Address", "Analog0@localhost")
            .with("Channel", "(Id=0,Name=StickX,Description=\"Stick X\")")
            .with("Channel", "(Id=1,Name=StickY,Description=\"Stick Y\")"),
    ]
}

fn main() {
    env_logger::init();

    let connector = LoopbackConnector::new(Delivery::Background);
    let head = connector.feed("Tracker0@localhost");
    let pad = connector.feed("Button0@localhost");
    let stick = connector.feed("Analog0@localhost");

    let mut keys: Vec<KeyDetails> = Vec::new();
    let sections = sections();
    let registry = Registry::from_sections(&sections, &Settings::from_env(), &connector, &mut keys);
    println!("Registered {} keys on {} devices", keys.len(), registry.len());
    for details in &keys {
        println!("  {:<20} {:?}  {}", details.key.as_str(), details.kind, details.description);
    }

    let producer = std::thread::spawn(move || {
        for i in 0..120u32 {
            let t = i as f64 * 0.05;
            let sent = head
                .tracker(0, [t.cos(), t.sin(), 0.0], [0.0, 0.0, 0.0, 1.0])
                .and_then(|_| stick.analog(&[t.sin(), t.cos()]))
                .and_then(|_| match i % 30 {
                    0 => pad.button(0, 1),
                    15 => pad.button(0, 0),
                    _ => Ok(()),
                });
            if let Err(e) = sent {
                eprintln!("Producer error: {}", e);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    });

    let start = Instant::now();
    let mut frames: u64 = 0;
    while start.elapsed() < Duration::from_secs(2) {
        let mut events: Vec<InputEvent> = Vec::new();
        let summary = registry.poll_all(&mut events);
        frames += 1;

        for event in &events {
            match event {
                InputEvent::KeyDown(key) => println!("frame {:>3}: {} down", frames, key),
                InputEvent::KeyUp(key) => println!("frame {:>3}: {} up", frames, key),
                InputEvent::Analog { .. } => {}
            }
        }

        // Print every ~20th frame to avoid flooding the terminal
        if frames % 20 == 1 {
            if let Some(pose) = registry.controller_pose(0, Hand::Left) {
                println!(
                    "frame {:>3}: pos=[{:+.2}, {:+.2}, {:+.2}] yaw={:+.1}  ({} events, {} failed)",
                    frames,
                    pose.position.x,
                    pose.position.y,
                    pose.position.z,
                    pose.rotator.yaw,
                    events.len(),
                    summary.failed,
                );
            }
        }
        std::thread::sleep(FRAME);
    }

    if producer.join().is_err() {
        eprintln!("Producer thread panicked");
    }
    println!("\nPolled {} frames in {:.1}s", frames, start.elapsed().as_secs_f64());
}
