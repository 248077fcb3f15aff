//! Process entry point: CLI parsing, wiring and shutdown propagation.

mod cli;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecast_codec::{CameraManager, CodecConfig, CodecId, CodecManager};
use framecast_engine::{
    convert_worker, drain_worker, feed_worker, stats_worker, PipelineContext, PipelineStats,
};
use framecast_net::{run_dispatcher, CameraControlServer, DispatchContext, PacketStreamServer};
use framecast_video::{FrameQueue, OverlayRenderer, PixelFormat, ReorderMap, FRAME_STAGE_CAPACITY};

use crate::cli::Args;

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "framecast_server=debug,framecast_engine=debug,framecast_codec=debug,\
                 framecast_net=debug,framecast_video=debug,framecast_proto=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            std::process::exit(0);
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(-1);
        }
    };

    init_logging();

    if let Err(message) = args.validate() {
        error!("{message}");
        std::process::exit(-2);
    }

    if let Err(message) = run(args) {
        error!("{message}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    info!("Initializing encoder.");
    let config = CodecConfig::new(
        CodecId::H264,
        PixelFormat::I420,
        &args.encode_preset,
        &args.encode_tune,
        args.width,
        args.height,
        args.bitrate,
        args.fps,
        args.keyint,
    );
    let codec = Arc::new(
        CodecManager::new(config).map_err(|err| format!("Encoder init failed: {err}"))?,
    );

    info!("Initializing text renderer.");
    let overlay =
        OverlayRenderer::new(&args.font).map_err(|err| format!("Font load failed: {err}"))?;

    info!("Initializing packet stream server.");
    let packet_stream = Arc::new(PacketStreamServer::new(args.packet_stream_server_port));
    packet_stream
        .start()
        .map_err(|err| format!("Packet stream server failed to start: {err}"))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let raw_queue = Arc::new(FrameQueue::new(FRAME_STAGE_CAPACITY));
    let reorder = Arc::new(ReorderMap::new(FRAME_STAGE_CAPACITY));
    let cameras = Arc::new(CameraManager::new(
        vec![Arc::clone(&codec)],
        args.width,
        args.height,
    ));
    let stats = Arc::new(PipelineStats::default());
    let frame_index = Arc::new(AtomicU64::new(0));

    info!("Initializing camera control server.");
    let camera_control = CameraControlServer::new(
        Arc::clone(&cameras),
        args.camera_control_server_port,
        Arc::clone(&shutdown),
    );
    camera_control
        .start()
        .map_err(|err| format!("Camera control server failed to start: {err}"))?;

    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Shutdown requested.");
            shutdown.store(true, Ordering::Relaxed);
        })
        .map_err(|err| format!("Failed to install signal handler: {err}"))?;
    }

    info!("Done bootstrapping.");

    let ctx = PipelineContext {
        raw_queue: Arc::clone(&raw_queue),
        reorder: Arc::clone(&reorder),
        codec: Arc::clone(&codec),
        stats: Arc::clone(&stats),
        shutdown: Arc::clone(&shutdown),
    };

    let mut workers = Vec::new();

    {
        let renderers = args.renderer.clone();
        let dispatch = DispatchContext {
            frame_index: Arc::clone(&frame_index),
            cameras: Arc::clone(&cameras),
            raw_queue: Arc::clone(&raw_queue),
            shutdown: Arc::clone(&shutdown),
        };
        spawn_worker(&mut workers, "dispatch", move || {
            run_dispatcher(renderers, dispatch)
        })?;
    }
    {
        let ctx = ctx.clone();
        spawn_worker(&mut workers, "convert", move || convert_worker(ctx, overlay))?;
    }
    {
        let ctx = ctx.clone();
        spawn_worker(&mut workers, "feed", move || feed_worker(ctx))?;
    }
    {
        let ctx = ctx.clone();
        let sink = Arc::clone(&packet_stream);
        spawn_worker(&mut workers, "drain", move || drain_worker(ctx, sink))?;
    }
    {
        let frame_index = Arc::clone(&frame_index);
        let stats = Arc::clone(&stats);
        let shutdown = Arc::clone(&shutdown);
        spawn_worker(&mut workers, "stats", move || {
            stats_worker(frame_index, stats, shutdown)
        })?;
    }

    for worker in workers {
        let _ = worker.join();
    }

    if let Err(err) = codec.shutdown() {
        error!(%err, "Encoder flush failed");
    }
    camera_control.stop();
    packet_stream.stop();

    info!("All threads are terminated. Shutting down.");
    Ok(())
}

fn spawn_worker(
    workers: &mut Vec<JoinHandle<()>>,
    name: &str,
    work: impl FnOnce() + Send + 'static,
) -> Result<(), String> {
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map_err(|err| format!("Failed to spawn {name} thread: {err}"))?;
    workers.push(handle);
    Ok(())
}
