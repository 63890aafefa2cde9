//! Headless flight over the planet.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p orbis-demo` to descend from orbit to the surface and
//! log how the tile tree follows the camera.
//! Run with `cargo run -p orbis-demo -- --frames 2000 --elevation noise` for a
//! longer flight over procedural mountains.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use orbis_config::{CliArgs, Config};
use orbis_geodesy::Geodetic;
use orbis_planet::{Camera, Planet, PlanetBuilder, UpdateStats};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "orbis-demo", about = "Fly a camera over an Orbis planet")]
struct DemoArgs {
    #[command(flatten)]
    planet: CliArgs,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Lowest altitude of the flight, meters above the ellipsoid.
    #[arg(long, default_value_t = 2_000.0)]
    cruise_height: f64,

    /// Simulated frame interval in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
}

/// Scripted path: exponential descent for the first half, then eastward cruise.
struct Flight {
    start: Geodetic,
    cruise_height: f64,
    frames: u32,
}

impl Flight {
    fn position(&self, frame: u32) -> Geodetic {
        let half = (self.frames / 2).max(1);
        if frame < half {
            let t = frame as f64 / half as f64;
            let ratio = self.cruise_height / self.start.height;
            Geodetic::new(
                self.start.lon,
                self.start.lat,
                self.start.height * ratio.powf(t),
            )
        } else {
            // ~0.01 degrees of longitude per frame
            let dlon = (frame - half) as f64 * 1.0e-2_f64.to_radians();
            Geodetic::new(self.start.lon + dlon, self.start.lat, self.cruise_height)
        }
    }
}

fn log_update(frame: u32, camera: &Camera, planet: &Planet, update: &UpdateStats) {
    let geo = camera.geodetic();
    let stats = planet.stats();
    info!(
        "frame {} at ({:.3}, {:.3}) h={:.0}m: {} tiles, {} leaves, {} visible, {} loading, \
         deepest level {}, {} pending, processed {} ({} left) in {:?}",
        frame,
        geo.lon_degrees(),
        geo.lat_degrees(),
        geo.height,
        stats.tiles,
        stats.leaves,
        stats.visible,
        stats.loading,
        stats.deepest_level,
        stats.pending_fetches,
        update.processed,
        update.remaining,
        update.elapsed,
    );
    info!(
        "  {} render tiles, {:.1} MiB mesh, {:.1} MiB texture, ground {:.0}m below",
        planet.render_list().len(),
        stats.mesh_bytes as f64 / (1024.0 * 1024.0),
        stats.texture_bytes as f64 / (1024.0 * 1024.0),
        planet.distance_to_ground(camera.position),
    );
}

fn main() -> ExitCode {
    let args = DemoArgs::parse();

    let config_dir = args
        .planet
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| std::path::PathBuf::from(".orbis"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.planet);

    let log_dir = config_dir.join("logs");
    orbis_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let mut camera = Camera::from_config(&config.camera);
    let mut planet = match PlanetBuilder::from_config(&config)
        .camera(camera.clone())
        .build()
    {
        Ok(planet) => planet,
        Err(e) => {
            error!("Failed to build planet: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let flight = Flight {
        start: camera.geodetic(),
        cruise_height: args.cruise_height.max(config.camera.min_height_above_ground_m),
        frames: args.frames,
    };
    let interval = config.debug.stats_interval_frames.max(1);
    let clearance = config.camera.min_height_above_ground_m;

    info!(
        "Flying {} frames from {:.0}m down to {:.0}m",
        args.frames, flight.start.height, flight.cruise_height
    );

    for frame in 0..args.frames {
        camera.place(flight.position(frame), 0.0, -std::f64::consts::FRAC_PI_2);
        if planet.clamp_camera_height(&mut camera, clearance) {
            tracing::debug!("frame {}: camera lifted above terrain", frame);
        }

        let update = planet.update(&camera);
        if frame % interval == 0 {
            log_update(frame, &camera, &planet, &update);
        }
        std::thread::sleep(Duration::from_millis(args.frame_ms));
    }

    let stats = planet.stats();
    info!(
        "Finished: {} tiles, deepest level {}, {} errored",
        stats.tiles, stats.deepest_level, stats.errored
    );
    ExitCode::SUCCESS
}
