//! demo - Drive a full scan session against a synthetic detection stream.
//!
//! Simulates an operator sweeping a camera across a handful of objects:
//! each object gets a settle phase (jittered, centered detections with calm
//! motion), separated by pan phases (high motion, no usable detections).
//! The session is expected to lock once per object, commit, and end the run
//! with one aggregated item per physical object.
//!
//! Useful for eyeballing guidance transitions with `RUST_LOG=debug`.

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use scan_kernel::{
    BoundingBox, FrameInput, FrameSignals, GuidanceState, RawDetection, ScanSession,
    ScriptedSource, SessionConfig, ThumbnailRef,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Synthetic scan session demo")]
struct Args {
    /// Number of simulated objects to sweep across.
    #[arg(long, default_value_t = 3)]
    objects: u32,

    /// Frames per settle phase on each object.
    #[arg(long, default_value_t = 45)]
    settle_frames: u32,

    /// Frames per pan phase between objects.
    #[arg(long, default_value_t = 12)]
    pan_frames: u32,

    /// Milliseconds between analyzed frames.
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,

    /// Seed for the jitter generator.
    #[arg(long, env = "DEMO_SEED", default_value_t = 7)]
    seed: u64,

    /// Print the final item collection as JSON.
    #[arg(long)]
    json: bool,
}

const CATEGORIES: [&str; 3] = ["FASHION", "ELECTRONICS", "HOME"];
const LABELS: [&str; 3] = ["Shirt", "Headphones", "Mug"];

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let frames = script(&args);
    log::info!(
        "demo: {} objects over {} frames",
        args.objects,
        frames.len()
    );

    let mut session = ScanSession::new(SessionConfig::default())?;
    let mut source = ScriptedSource::new(frames);

    let mut last_state = GuidanceState::Searching;
    let mut commits = 0usize;
    while let Some(report) = session.process_from(&mut source) {
        if report.state != last_state {
            log::info!(
                "frame {:>4}: {} (hint: {})",
                report.frame_index,
                report.state.as_str(),
                report.hint_key
            );
            last_state = report.state;
        }
        if report.can_commit {
            if let Some(event) = session.commit_locked() {
                commits += 1;
                log::info!(
                    "frame {:>4}: committed -> {} ({})",
                    report.frame_index,
                    event.outcome.item_id(),
                    if event.outcome.is_merge() {
                        "merged"
                    } else {
                        "created"
                    }
                );
                last_state = session.state();
            }
        }
    }

    let stats = session.stats();
    println!(
        "{} commits -> {} items, {} merges ({:.2} merges/item)",
        commits, stats.total_items, stats.total_merges, stats.average_merges_per_item
    );
    for item in session.items() {
        println!(
            "  {}: {} / {} (merges: {}, max confidence: {:.2})",
            item.id,
            item.category.as_deref().unwrap_or("-"),
            item.label.as_deref().unwrap_or("-"),
            item.merge_count,
            item.max_confidence
        );
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&session.items())?);
    }
    println!("diagnostics: {:?}", session.diag());

    Ok(())
}

/// Build the scripted frame sequence: settle on each object, pan between.
fn script(args: &Args) -> Vec<FrameInput> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut frames = Vec::new();
    let mut frame_index = 0u64;

    for object in 0..args.objects {
        let category = CATEGORIES[object as usize % CATEGORIES.len()];
        let label = LABELS[object as usize % LABELS.len()];

        for _ in 0..args.settle_frames {
            let jitter_x: f32 = rng.gen_range(-0.01..0.01);
            let jitter_y: f32 = rng.gen_range(-0.01..0.01);
            let detection = RawDetection::new(
                BoundingBox::new(
                    0.36 + jitter_x,
                    0.36 + jitter_y,
                    0.64 + jitter_x,
                    0.64 + jitter_y,
                ),
                rng.gen_range(0.75..0.95),
            )
            .with_category(category)
            .with_label(label)
            // The upstream id churns on purpose; the tracker must not care.
            .with_tracking_id(rng.gen_range(0..1000))
            .with_thumbnail(ThumbnailRef(u64::from(object)));
            push_frame(
                &mut frames,
                &mut frame_index,
                args.frame_interval_ms,
                vec![detection],
                rng.gen_range(0.0..0.08),
            );
        }

        for _ in 0..args.pan_frames {
            push_frame(
                &mut frames,
                &mut frame_index,
                args.frame_interval_ms,
                vec![],
                rng.gen_range(0.5..0.9),
            );
        }
    }

    frames
}

fn push_frame(
    frames: &mut Vec<FrameInput>,
    frame_index: &mut u64,
    frame_interval_ms: u64,
    detections: Vec<RawDetection>,
    motion: f32,
) {
    let timestamp_ms = *frame_index * frame_interval_ms;
    frames.push(
        FrameInput::new(*frame_index, timestamp_ms, detections).with_signals(FrameSignals {
            motion,
            sharpness: 1.0,
            focus_event: false,
        }),
    );
    *frame_index += 1;
}
