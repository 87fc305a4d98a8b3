//! flipbook - headless driver for FlipbookView
//!
//! Plays a numbered image sequence against an off-screen canvas: redraw
//! requests arrive on a channel, every draw pass is logged, and the view is
//! recycled when the run time is over.

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use glam::Affine2;
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flipbook::cli::Args;
use flipbook::config::FlipbookConfig;
use flipbook::entities::frame::Bitmap;
use flipbook::entities::loader::{FsResourceStore, ImageDecoder};
use flipbook::entities::traits::Canvas;
use flipbook::view::FlipbookView;

/// Canvas that only records what would be drawn
#[derive(Default)]
struct LogCanvas {
    draws: u64,
}

impl Canvas for LogCanvas {
    fn draw_bitmap(&mut self, bitmap: &Bitmap, transform: &Affine2) {
        self.draws += 1;
        let (w, h) = bitmap.dimensions();
        trace!(
            "draw {}x{} {:?} scale=({:.3}, {:.3}) offset=({:.1}, {:.1})",
            w,
            h,
            bitmap.format(),
            transform.matrix2.x_axis.x,
            transform.matrix2.y_axis.y,
            transform.translation.x,
            transform.translation.y
        );
    }
}

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| "flipbook.log".into());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    let config_path = FlipbookConfig::locate(args.config.clone());
    let mut config = FlipbookConfig::load(config_path.as_deref())?;
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }
    args.apply(&mut config);
    config.validate()?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if config.template.is_empty() {
        bail!("No frame template given (pass TEMPLATE or set \"template\" in the config)");
    }

    let (redraw_tx, redraw_rx) = unbounded::<()>();
    let view = FlipbookView::new(
        &config,
        Arc::new(FsResourceStore::new(&args.root)),
        Arc::new(ImageDecoder),
        Arc::new(move || {
            let _ = redraw_tx.send(());
        }),
    )?;
    if view.frame_count() == 0 {
        bail!("No frames found for {} under {}", config.template, args.root.display());
    }

    view.set_listener(|index, state| info!("Frame {} ({:?})", index, state));
    let (w, h) = args.viewport();
    view.on_size_changed(w, h);
    if let Some(target) = args.to_frame {
        view.play_to_frame(target, Duration::from_millis(args.delay_ms));
    } else if config.auto_play && args.delay_ms > 0 {
        view.play(Duration::from_millis(args.delay_ms));
    }

    let mut canvas = LogCanvas::default();
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds.max(0.0));
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match redraw_rx.recv_timeout(remaining) {
            Ok(()) => {
                // Coalesce a backlog into one pass
                redraw_rx.try_iter().for_each(drop);
                view.draw(&mut canvas);
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Redraw channel closed");
                break;
            }
        }
    }

    let snap = view.snapshot();
    let (drawn, failures) = view.render_stats();
    let stats = view.pool_stats();
    view.recycle();

    println!(
        "frames={} current={} state={:?} drawn={} canvas_draws={} failures={} pool_hit_rate={:.2} (hits={} misses={} pruned={})",
        view.frame_count(),
        snap.current_frame,
        snap.state,
        drawn,
        canvas.draws,
        failures,
        stats.hit_rate(),
        stats.hits(),
        stats.misses(),
        stats.pruned()
    );
    Ok(())
}
