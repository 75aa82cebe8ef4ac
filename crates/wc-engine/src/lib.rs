// World Cup tournament simulation engine

pub mod aggregate;
pub mod loss;
pub mod model;
pub mod reconcile;
pub mod runner;
pub mod tournament;

pub use aggregate::ResultAggregator;
pub use loss::{LossEvaluator, LossSummary};
pub use model::{PoissonFitter, PoissonStrengthModel, TeamStrength};
pub use reconcile::{resolve_resume, ResumeReconciler};
pub use runner::{
    BatchOutput, BatchPlan, HandOff, RunReport, SimulationContext, SimulationRunner,
};
pub use tournament::{SampleOutcome, TournamentSimulator};

/// Install the `fmt` subscriber used by the binaries. `RUST_LOG` overrides
/// the default `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
