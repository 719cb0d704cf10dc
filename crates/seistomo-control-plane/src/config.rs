//! Control plane configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Command-line arguments, with `SEISTOMO_*` environment fallbacks.
#[derive(Parser, Debug)]
#[command(
    name = "seistomo-control-plane",
    about = "Seismic acquisition and tomography task pipeline"
)]
pub struct Args {
    /// HTTP server address
    #[arg(long, env = "SEISTOMO_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub http_addr: String,

    /// SQLite database URL
    #[arg(
        long,
        env = "SEISTOMO_DATABASE_URL",
        default_value = "sqlite://seistomo.db?mode=rwc"
    )]
    pub database_url: String,

    /// Base URL of the FDSN data service
    #[arg(long, env = "FDSN_BASE")]
    pub fdsn_base: String,

    /// Per-request timeout for data service fetches, in seconds
    #[arg(long, env = "SEISTOMO_FETCH_TIMEOUT_SECS", default_value = "300")]
    pub fetch_timeout_secs: u64,

    /// Attempts per data service request, including the first
    #[arg(long, env = "SEISTOMO_FETCH_ATTEMPTS", default_value = "3")]
    pub fetch_attempts: u32,

    /// Directory receiving per-task solver files
    #[arg(long, env = "SEISTOMO_ARTIFACT_ROOT", default_value = "./artifacts")]
    pub artifact_root: PathBuf,

    /// Relief raster (`lon lat elevation_m` per line)
    #[arg(long, env = "SEISTOMO_RELIEF_PATH", default_value = "./relief.dat")]
    pub relief_path: PathBuf,

    /// Tomography solver executable
    #[arg(long, env = "SEISTOMO_SOLVER_PATH")]
    pub solver_path: String,

    /// Solver timeout, in seconds
    #[arg(long, env = "SEISTOMO_SOLVER_TIMEOUT_SECS", default_value = "21600")]
    pub solver_timeout_secs: u64,

    /// Channel whose picks are paired into P/S detections
    #[arg(long, env = "SEISTOMO_REFERENCE_CHANNEL", default_value = "HHN")]
    pub reference_channel: String,

    /// Upper edge of the velocity grid, km
    #[arg(
        long,
        env = "SEISTOMO_GRID_DEPTH_MIN_KM",
        default_value = "-1",
        allow_negative_numbers = true
    )]
    pub grid_depth_min_km: f64,

    /// Lower edge of the velocity grid, km
    #[arg(long, env = "SEISTOMO_GRID_DEPTH_MAX_KM", default_value = "60")]
    pub grid_depth_max_km: f64,
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_addr: String,

    /// SQLite database URL.
    pub database_url: String,

    /// FDSN data service base URL.
    pub fdsn_base: String,

    /// Per-request fetch timeout.
    pub fetch_timeout: Duration,

    /// Attempts per fetch.
    pub fetch_attempts: u32,

    /// Root of the per-task artifact directories.
    pub artifact_root: PathBuf,

    /// Relief raster path.
    pub relief_path: PathBuf,

    /// Solver executable.
    pub solver_path: String,

    /// Solver timeout.
    pub solver_timeout: Duration,

    /// Pick channel used for P/S matching.
    pub reference_channel: String,

    /// Vertical grid extent, km.
    pub grid_depth_min_km: f64,
    pub grid_depth_max_km: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".to_string(),
            database_url: "sqlite://seistomo.db?mode=rwc".to_string(),
            fdsn_base: "http://127.0.0.1:8081".to_string(),
            fetch_timeout: Duration::from_secs(300),
            fetch_attempts: 3,
            artifact_root: PathBuf::from("./artifacts"),
            relief_path: PathBuf::from("./relief.dat"),
            solver_path: "st3d".to_string(),
            solver_timeout: Duration::from_secs(6 * 60 * 60),
            reference_channel: "HHN".to_string(),
            grid_depth_min_km: -1.0,
            grid_depth_max_km: 60.0,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            http_addr: args.http_addr,
            database_url: args.database_url,
            fdsn_base: args.fdsn_base,
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
            fetch_attempts: args.fetch_attempts,
            artifact_root: args.artifact_root,
            relief_path: args.relief_path,
            solver_path: args.solver_path,
            solver_timeout: Duration::from_secs(args.solver_timeout_secs),
            reference_channel: args.reference_channel,
            grid_depth_min_km: args.grid_depth_min_km,
            grid_depth_max_km: args.grid_depth_max_km,
        }
    }
}

impl Config {
    /// Directory holding one task's files.
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.artifact_root.join(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from([
            "seistomo-control-plane",
            "--fdsn-base",
            "http://fdsn.example",
            "--solver-path",
            "/usr/bin/st3d",
        ]);
        let config = Config::from(args);
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.fetch_timeout, Duration::from_secs(300));
        assert_eq!(config.fetch_attempts, 3);
        assert_eq!(config.solver_timeout, Duration::from_secs(21600));
        assert_eq!(config.reference_channel, "HHN");
        assert_eq!(config.grid_depth_min_km, -1.0);
        assert_eq!(config.grid_depth_max_km, 60.0);
    }

    #[test]
    fn test_task_dir() {
        let config = Config {
            artifact_root: PathBuf::from("/data/artifacts"),
            ..Default::default()
        };
        assert_eq!(config.task_dir("abc"), PathBuf::from("/data/artifacts/abc"));
    }
}
