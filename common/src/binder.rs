// Parameter binding: payload + environment -> validated typed parameters
//
// All three modes share one pipeline: transport decode, environment seeding,
// JSON merge over the seeded document, typed decode, schema validation.

use crate::context::ActuatorContext;
use crate::env::{self, EnvBinding, EnvSource};
use crate::errors::{BindError, PayloadError};
use crate::general::GeneralParams;
use crate::payload::{self, PayloadFormat};
use crate::schema::Schema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

/// Operation parameters that can be bound from a payload
pub trait Params: Default + Serialize + DeserializeOwned {
    /// Environment variables allowed to pre-fill fields
    fn env_bindings() -> &'static [EnvBinding] {
        &[]
    }

    /// Structural rules checked after decoding
    fn schema() -> Schema {
        Schema::new()
    }

    /// Example value printed by `--helper`
    fn example() -> Self {
        Self::default()
    }
}

/// How the payload document maps onto the parameters
///
/// Chosen by each operation; never inferred from the payload content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// `{"general": {...}, "extend": {...}}`; installs `general` into the context
    LayeredEnvelope,
    /// Fields at the top level; a top-level `general` object is seeded from
    /// the shared account environment as well
    FlatStrict,
    /// Fields at the top level, no shared account handling
    FlatSimple,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    general: GeneralParams,
    extend: T,
}

/// Binds one payload string for one invocation
pub struct PayloadBinder<'a> {
    payload: &'a str,
    format: PayloadFormat,
    env: &'a dyn EnvSource,
}

impl<'a> PayloadBinder<'a> {
    pub fn new(payload: &'a str, format: PayloadFormat, env: &'a dyn EnvSource) -> Self {
        Self {
            payload,
            format,
            env,
        }
    }

    /// Decode, seed, merge and validate the payload into `T`
    ///
    /// Only [`BindMode::LayeredEnvelope`] replaces the shared accounts held by
    /// `ctx`, and only after validation succeeded.
    #[instrument(skip_all, fields(mode = ?mode, format = %self.format))]
    pub fn bind<T: Params>(
        &self,
        mode: BindMode,
        ctx: &mut ActuatorContext,
    ) -> Result<T, BindError> {
        let body = payload::decode(self.payload, self.format)?;

        match mode {
            BindMode::LayeredEnvelope => {
                let mut doc = json!({
                    "general": self.seeded::<GeneralParams>()?,
                    "extend": self.seeded::<T>()?,
                });
                merge(&mut doc, parse_body(&body)?);

                let envelope: Envelope<T> =
                    serde_json::from_value(doc).map_err(PayloadError::JsonDecode)?;
                let typed = serde_json::to_value(&envelope).map_err(PayloadError::JsonDecode)?;
                envelope_schema::<T>().validate(&typed)?;

                ctx.replace_general(envelope.general);
                info!("Payload parsed, shared runtime accounts installed");
                Ok(envelope.extend)
            }
            BindMode::FlatStrict | BindMode::FlatSimple => {
                let mut doc = self.seeded::<T>()?;
                if mode == BindMode::FlatStrict {
                    if let Some(general) = doc.get_mut("general") {
                        let applied = env::seed::<GeneralParams>(
                            general,
                            GeneralParams::env_bindings(),
                            self.env,
                        );
                        debug!(applied, "Seeded general sibling from environment");
                    }
                }
                merge(&mut doc, parse_body(&body)?);

                let params: T = serde_json::from_value(doc).map_err(PayloadError::JsonDecode)?;
                let typed = serde_json::to_value(&params).map_err(PayloadError::JsonDecode)?;
                T::schema().validate(&typed)?;

                info!("Payload parsed");
                Ok(params)
            }
        }
    }

    /// JSON form of `T::default()` with environment bindings applied
    fn seeded<T: Params>(&self) -> Result<Value, PayloadError> {
        let mut doc = serde_json::to_value(T::default())?;
        let applied = env::seed::<T>(&mut doc, T::env_bindings(), self.env);
        debug!(applied, "Params seeded from environment");
        Ok(doc)
    }
}

fn parse_body(body: &[u8]) -> Result<Value, PayloadError> {
    Ok(serde_json::from_slice(body)?)
}

fn envelope_schema<T: Params>() -> Schema {
    GeneralParams::schema()
        .prefixed("general")
        .merge(T::schema().prefixed("extend"))
}

/// Overlay `patch` onto `base`; objects merge key by key, `null` keeps the base
pub fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, patch) => *base = patch,
    }
}

/// The payload document `--helper` prints for a mode
pub fn example_payload<T: Params>(mode: BindMode) -> Result<Value, serde_json::Error> {
    let extend = serde_json::to_value(T::example())?;
    Ok(match mode {
        BindMode::LayeredEnvelope => json!({
            "general": GeneralParams::example(),
            "extend": extend,
        }),
        BindMode::FlatStrict | BindMode::FlatSimple => extend,
    })
}
