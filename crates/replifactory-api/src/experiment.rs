// Experiment and plot endpoints

use serde_json::Value;
use tracing::debug;

use crate::client::GatewayClient;
use crate::error::Error;
use crate::models::{
    CreateExperimentRequest, ExperimentRecord, GrowthParametersResponse, ParametersRequest,
    ParametersResponse, SelectExperimentRequest, SimulationResponse, StatusRequest,
};

impl GatewayClient {
    /// `GET /experiments`
    pub async fn list_experiments(&self) -> Result<Vec<ExperimentRecord>, Error> {
        self.get("experiments").await
    }

    /// Create an experiment. Does not select it.
    ///
    /// `POST /experiments`
    pub async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord, Error> {
        debug!(name, "creating experiment");
        self.post("experiments", &CreateExperimentRequest { name })
            .await
    }

    /// Make `id` the globally selected experiment. The response body is
    /// returned as-is; callers refetch the current experiment.
    ///
    /// `PUT /experiments`
    pub async fn select_experiment(&self, id: i64) -> Result<Value, Error> {
        debug!(id, "selecting experiment");
        self.put(
            "experiments",
            Some(&SelectExperimentRequest { experiment_id: id }),
        )
        .await
    }

    /// `GET /experiments/current`; `None` when nothing is selected.
    pub async fn current_experiment(&self) -> Result<Option<ExperimentRecord>, Error> {
        self.get("experiments/current").await
    }

    /// Post a status transition (`running`, `paused`, `stopped`).
    ///
    /// `POST /experiments/current/status`
    pub async fn set_experiment_status(&self, status: &str) -> Result<Value, Error> {
        debug!(status, "updating experiment status");
        self.post("experiments/current/status", &StatusRequest { status })
            .await
    }

    /// `GET /experiments/{id}/parameters`
    pub async fn experiment_parameters(&self, id: i64) -> Result<Value, Error> {
        self.get(&format!("experiments/{id}/parameters")).await
    }

    /// Replace the current experiment's parameters.
    ///
    /// `PUT /experiments/current/parameters`
    pub async fn update_current_parameters(&self, parameters: &Value) -> Result<Value, Error> {
        let resp: ParametersResponse = self
            .put(
                "experiments/current/parameters",
                Some(&ParametersRequest { parameters }),
            )
            .await?;
        Ok(resp.parameters)
    }

    /// `GET /experiments/current/growth_parameters`
    pub async fn current_growth_parameters(&self) -> Result<Value, Error> {
        let resp: GrowthParametersResponse =
            self.get("experiments/current/growth_parameters").await?;
        Ok(resp.growth_parameters)
    }

    /// Replace the current experiment's growth parameters. The body is the
    /// parameter object itself.
    ///
    /// `PUT /experiments/current/growth_parameters`
    pub async fn update_current_growth_parameters(&self, growth: &Value) -> Result<Value, Error> {
        let resp: GrowthParametersResponse = self
            .put("experiments/current/growth_parameters", Some(growth))
            .await?;
        Ok(resp.growth_parameters)
    }

    /// Run a growth simulation for one vial.
    ///
    /// `PUT /cultures/{vial}/run-simulation?simulation_hours={hours}`
    pub async fn run_simulation(&self, vial: u8, hours: u32) -> Result<SimulationResponse, Error> {
        debug!(vial, hours, "running simulation");
        self.put(
            &format!("cultures/{vial}/run-simulation?simulation_hours={hours}"),
            None::<&Value>,
        )
        .await
    }

    // ── Plots ────────────────────────────────────────────────────────

    /// Plotly figure for one vial's culture data.
    ///
    /// `GET /plot/{vial}`
    pub async fn culture_plot(&self, vial: u8) -> Result<Value, Error> {
        self.get(&format!("plot/{vial}")).await
    }

    /// Plotly figure for one vial's simulated projection.
    ///
    /// `GET /plot/{vial}/simulation`
    pub async fn simulation_plot(&self, vial: u8) -> Result<Value, Error> {
        self.get(&format!("plot/{vial}/simulation")).await
    }
}
