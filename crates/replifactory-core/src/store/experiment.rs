// ── Experiment state store ──
//
// Two independently refreshable projections (the experiment list and the
// current selection) plus lazily fetched per-vial plots. Experiment
// writes refetch only the projection they touch.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use replifactory_api::GatewayClient;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::sequence::Projection;
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    Experiment, ExperimentStatus, PlotKind, PlotReport, PlotSeries, SimulationRun, VIAL_COUNT,
};
use crate::stream::StateStream;

/// Simulation horizon accepted by [`ExperimentStore::run_simulation`].
pub const SIMULATION_HOURS: std::ops::RangeInclusive<u32> = 1..=240;

type PlotSlot = Arc<Projection<Option<Arc<PlotSeries>>>>;

pub struct ExperimentStore {
    api: GatewayClient,
    experiments: Projection<Arc<Vec<Experiment>>>,
    current: Projection<Option<Arc<Experiment>>>,
    plots: DashMap<(PlotKind, u8), PlotSlot>,
    selected_vials: watch::Sender<BTreeMap<u8, bool>>,
    error_message: watch::Sender<Option<String>>,
}

impl ExperimentStore {
    pub(crate) fn new(api: GatewayClient) -> Self {
        let (selected_vials, _) = watch::channel(BTreeMap::new());
        let (error_message, _) = watch::channel(None);
        Self {
            api,
            experiments: Projection::new("experiments", Arc::new(Vec::new())),
            current: Projection::new("current_experiment", None),
            plots: DashMap::new(),
            selected_vials,
            error_message,
        }
    }

    // ── Projection accessors ─────────────────────────────────────────

    pub fn experiments(&self) -> Arc<Vec<Experiment>> {
        self.experiments.get()
    }

    pub fn subscribe_experiments(&self) -> StateStream<Arc<Vec<Experiment>>> {
        StateStream::new(self.experiments.subscribe())
    }

    pub fn current_experiment(&self) -> Option<Arc<Experiment>> {
        self.current.get()
    }

    pub fn subscribe_current(&self) -> StateStream<Option<Arc<Experiment>>> {
        StateStream::new(self.current.subscribe())
    }

    /// A fetched plot, or `None` if that slot has not been fetched yet.
    pub fn plot(&self, kind: PlotKind, vial: u8) -> Option<Arc<PlotSeries>> {
        self.plots.get(&(kind, vial)).and_then(|slot| slot.value().get())
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.borrow().clone()
    }

    fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "experiment action failed");
        self.error_message.send_replace(Some(message));
    }

    fn plot_slot(&self, kind: PlotKind, vial: u8) -> PlotSlot {
        self.plots
            .entry((kind, vial))
            .or_insert_with(|| Arc::new(Projection::new("plot", None)))
            .clone()
    }

    // ── Vial selection (client only) ─────────────────────────────────

    pub fn selected_vials(&self) -> BTreeMap<u8, bool> {
        self.selected_vials.borrow().clone()
    }

    pub fn set_selected_vials(&self, selection: BTreeMap<u8, bool>) {
        self.selected_vials.send_replace(selection);
    }

    pub fn set_vial_selected(&self, vial: u8, selected: bool) {
        self.selected_vials.send_modify(|map| {
            map.insert(vial, selected);
        });
    }

    /// Selected vials, ascending.
    pub fn filtered_vials(&self) -> Vec<u8> {
        self.selected_vials
            .borrow()
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(vial, _)| *vial)
            .collect()
    }

    // ── Experiments ──────────────────────────────────────────────────

    /// Replace the experiment list wholesale.
    pub async fn fetch_experiments(&self) -> Result<Arc<Vec<Experiment>>, CoreError> {
        let ticket = self.experiments.ticket();
        let records = self.api.list_experiments().await?;
        let list: Vec<Experiment> = records.into_iter().map(convert::experiment).collect();
        debug!(count = list.len(), "experiments fetched");
        self.experiments.apply(ticket, Arc::new(list));
        Ok(self.experiments.get())
    }

    /// Replace the current-experiment projection.
    pub async fn fetch_current_experiment(&self) -> Result<Option<Arc<Experiment>>, CoreError> {
        let ticket = self.current.ticket();
        let record = self.api.current_experiment().await?;
        self.current
            .apply(ticket, record.map(|r| Arc::new(convert::experiment(r))));
        Ok(self.current.get())
    }

    /// Create an experiment, refresh the list, then select it.
    ///
    /// Creation does not select on the backend, so three calls go out in
    /// order and the list shows the new entry before it becomes current.
    pub async fn create_experiment(&self, name: &str) -> Result<Option<Arc<Experiment>>, CoreError> {
        let created = self.api.create_experiment(name).await?;
        info!(id = created.id, name, "experiment created");
        self.fetch_experiments().await?;
        self.select_experiment(created.id).await
    }

    pub async fn select_experiment(&self, id: i64) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.api.select_experiment(id).await?;
        self.fetch_current_experiment().await
    }

    // ── Status transitions ───────────────────────────────────────────

    pub async fn start_experiment(&self) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.update_experiment_status(ExperimentStatus::Running).await
    }

    pub async fn pause_experiment(&self) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.update_experiment_status(ExperimentStatus::Paused).await
    }

    pub async fn stop_experiment(&self) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.update_experiment_status(ExperimentStatus::Stopped).await
    }

    /// Post a status transition. Validity is the backend's call; its
    /// refusal comes back verbatim as [`CoreError::Rejected`].
    pub async fn update_experiment_status(
        &self,
        status: ExperimentStatus,
    ) -> Result<Option<Arc<Experiment>>, CoreError> {
        if status == ExperimentStatus::Unknown {
            return Err(CoreError::ValidationFailed {
                message: "cannot request an unknown experiment status".into(),
            });
        }
        if let Err(e) = self.api.set_experiment_status(status.as_str()).await {
            let err = CoreError::rejection(e);
            self.record_error(err.server_message().map_or_else(
                || "An error occurred while updating experiment status.".to_owned(),
                str::to_owned,
            ));
            return Err(err);
        }
        info!(%status, "experiment status updated");
        self.fetch_current_experiment().await
    }

    // ── Parameters ───────────────────────────────────────────────────

    pub async fn fetch_experiment_parameters(&self, id: i64) -> Result<Value, CoreError> {
        Ok(self.api.experiment_parameters(id).await?)
    }

    /// Replace the current experiment's parameters, then refetch it.
    pub async fn update_current_experiment_parameters(
        &self,
        parameters: &Value,
    ) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.api.update_current_parameters(parameters).await?;
        self.fetch_current_experiment().await
    }

    /// Fetch growth parameters and patch them into the current
    /// experiment, if one is loaded.
    pub async fn fetch_current_growth_parameters(&self) -> Result<Value, CoreError> {
        let ticket = self.current.ticket();
        let growth = self.api.current_growth_parameters().await?;
        self.current.apply_with(ticket, |current| {
            if let Some(exp) = current {
                let exp = Arc::make_mut(exp);
                if let Value::Object(map) = &mut exp.parameters {
                    map.insert("growth_parameters".into(), growth.clone());
                }
            }
        });
        Ok(growth)
    }

    pub async fn update_current_growth_parameters(
        &self,
        growth: &Value,
    ) -> Result<Option<Arc<Experiment>>, CoreError> {
        self.api.update_current_growth_parameters(growth).await?;
        self.fetch_current_experiment().await
    }

    // ── Plots ────────────────────────────────────────────────────────

    pub async fn fetch_culture_plot(&self, vial: u8) -> Result<Arc<PlotSeries>, CoreError> {
        self.fetch_plot(PlotKind::Culture, vial).await
    }

    pub async fn fetch_simulation_plot(&self, vial: u8) -> Result<Arc<PlotSeries>, CoreError> {
        self.fetch_plot(PlotKind::Simulation, vial).await
    }

    async fn fetch_plot(&self, kind: PlotKind, vial: u8) -> Result<Arc<PlotSeries>, CoreError> {
        check_vial(vial)?;
        let slot = self.plot_slot(kind, vial);
        let ticket = slot.ticket();

        let result = match kind {
            PlotKind::Culture => self.api.culture_plot(vial).await,
            PlotKind::Simulation => self.api.simulation_plot(vial).await,
        };
        match result {
            Ok(figure) => {
                let series = Arc::new(convert::plot(vial, kind, figure));
                slot.apply(ticket, Some(Arc::clone(&series)));
                Ok(series)
            }
            Err(e) => {
                self.record_error(format!("Failed to fetch {kind} plot."));
                Err(e.into())
            }
        }
    }

    /// Fetch culture plots for every selected vial, one at a time.
    ///
    /// A failing vial is recorded and the rest still run. Nothing is
    /// fetched while no experiment is current.
    pub async fn plot_all_data(&self) -> PlotReport {
        let mut report = PlotReport::default();
        if self.current.get().is_none() {
            debug!("no current experiment; skipping plot refresh");
            return report;
        }
        for vial in self.filtered_vials() {
            match self.fetch_culture_plot(vial).await {
                Ok(_) => report.fetched.push(vial),
                Err(e) => {
                    debug!(vial, error = %e, "culture plot failed");
                    report.failed.push(vial);
                }
            }
        }
        report
    }

    /// Run a growth simulation for one vial, then refetch its
    /// simulation plot.
    pub async fn run_simulation(&self, vial: u8, hours: u32) -> Result<SimulationRun, CoreError> {
        check_vial(vial)?;
        if !SIMULATION_HOURS.contains(&hours) {
            return Err(CoreError::ValidationFailed {
                message: format!(
                    "simulation hours must be between {} and {}, got {hours}",
                    SIMULATION_HOURS.start(),
                    SIMULATION_HOURS.end()
                ),
            });
        }

        let resp = self.api.run_simulation(vial, hours).await.map_err(|e| {
            let err = CoreError::from(e);
            self.record_error(format!("Failed to run simulation for vial {vial}"));
            err
        })?;
        self.fetch_simulation_plot(vial).await?;

        Ok(SimulationRun {
            vial,
            hours,
            message: resp.message,
            summary: resp.summary_data,
        })
    }
}

fn check_vial(vial: u8) -> Result<(), CoreError> {
    if (1..=VIAL_COUNT).contains(&vial) {
        Ok(())
    } else {
        Err(CoreError::ValidationFailed {
            message: format!("vial must be between 1 and {VIAL_COUNT}, got {vial}"),
        })
    }
}
