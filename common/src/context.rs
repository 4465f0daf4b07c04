// Per-invocation identity and the context handed to every step

use crate::general::GeneralParams;
use crate::payload::PayloadFormat;
use serde::Serialize;
use tracing::Span;

/// Correlation identifiers of one actuator invocation
///
/// Built once from the command line and never mutated; it only tags log
/// output and never drives control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunContext {
    uid: String,
    root_id: String,
    node_id: String,
    version_id: String,
    payload_format: PayloadFormat,
}

impl RunContext {
    pub fn new(
        uid: impl Into<String>,
        root_id: impl Into<String>,
        node_id: impl Into<String>,
        version_id: impl Into<String>,
        payload_format: PayloadFormat,
    ) -> Self {
        Self {
            uid: uid.into(),
            root_id: root_id.into(),
            node_id: node_id.into(),
            version_id: version_id.into(),
            payload_format,
        }
    }

    /// Job id
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Run id of the orchestrator flow
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    pub fn payload_format(&self) -> PayloadFormat {
        self.payload_format
    }

    /// Root span; every event recorded inside it carries the run identifiers
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "actuator",
            uid = %self.uid,
            root_id = %self.root_id,
            node_id = %self.node_id,
            version_id = %self.version_id,
        )
    }
}

/// Everything a step may read while it runs
#[derive(Debug, Clone, Default)]
pub struct ActuatorContext {
    run: RunContext,
    general: GeneralParams,
    external: bool,
}

impl ActuatorContext {
    pub fn new(run: RunContext, external: bool) -> Self {
        Self {
            run,
            general: GeneralParams::default(),
            external,
        }
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Shared accounts installed by the layered binder
    pub fn general(&self) -> &GeneralParams {
        &self.general
    }

    /// Whether the actuator was built for external deployments
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub(crate) fn replace_general(&mut self, general: GeneralParams) {
        self.general = general;
    }

    /// Render a result for the orchestrator as `<ctx>{json}</ctx>` on stdout
    pub fn output_ctx<T: Serialize>(&self, value: &T) -> Result<(), serde_json::Error> {
        println!("{}", render_ctx(value)?);
        Ok(())
    }
}

/// The `<ctx>` wrapped form scraped from stdout by the orchestrator
pub fn render_ctx<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("<ctx>{}</ctx>", serde_json::to_string(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_context_accessors() {
        let run = RunContext::new("1001", "root-7", "node-3", "v2", PayloadFormat::Raw);
        assert_eq!(run.uid(), "1001");
        assert_eq!(run.root_id(), "root-7");
        assert_eq!(run.node_id(), "node-3");
        assert_eq!(run.version_id(), "v2");
        assert_eq!(run.payload_format(), PayloadFormat::Raw);
    }

    #[test]
    fn test_new_context_has_empty_general() {
        let ctx = ActuatorContext::new(RunContext::default(), true);
        assert!(ctx.is_external());
        assert_eq!(ctx.general(), &GeneralParams::default());
    }

    #[test]
    fn test_render_ctx() {
        let rendered = render_ctx(&json!({"file": "/data/dbbak/a.sql"})).unwrap();
        assert_eq!(rendered, r#"<ctx>{"file":"/data/dbbak/a.sql"}</ctx>"#);
    }
}
