//! Métricas Prometheus del pipeline

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub intakes: IntCounter,
    pub extraction_outcomes: IntCounterVec,
    pub documents_generated: IntCounterVec,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("repair_orders".to_string()), None)?;

        let intakes = IntCounter::with_opts(Opts::new(
            "intakes_total",
            "Work orders accepted through intake",
        ))?;
        let extraction_outcomes = IntCounterVec::new(
            Opts::new(
                "extraction_outcomes_total",
                "Extraction outcomes by artifact kind and outcome",
            ),
            &["kind", "outcome"],
        )?;
        let documents_generated = IntCounterVec::new(
            Opts::new(
                "documents_generated_total",
                "Generated documents by type and format",
            ),
            &["document_type", "format"],
        )?;

        registry.register(Box::new(intakes.clone()))?;
        registry.register(Box::new(extraction_outcomes.clone()))?;
        registry.register(Box::new(documents_generated.clone()))?;

        Ok(Self {
            registry,
            intakes,
            extraction_outcomes,
            documents_generated,
        })
    }

    /// Exposición en formato texto de Prometheus
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
