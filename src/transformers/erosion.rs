//! Leading-edge erosion loss from precipitation and wind speed
//!
//! The physical model is a seam: the transformer only pairs the two input
//! series year by year and hands each pair to an [`ErosionModel`].

use std::collections::BTreeMap;

use super::{TransformContext, TransformerOutput};
use crate::audit::AuditEntryType;
use crate::error::TransformError;
use crate::series::{PercentileSeries, SourceData};

/// Processed source holding cumulative precipitation (mm)
pub const PRECIPITATION_SOURCE: &str = "cumulativePrecipitation";

/// Processed source holding mean wind speed (m/s)
pub const WIND_SPEED_SOURCE: &str = "windSpeed";

/// Deterministic model turning one year's conditions into a loss percentage
pub trait ErosionModel: Send + Sync {
    /// Annual energy loss in percent for cumulative precipitation (mm) and
    /// mean wind speed (m/s)
    fn annual_loss(&self, cumulative_precipitation: f64, wind_speed: f64) -> f64;
}

/// Rain erosion with saturating damage
///
/// Impact grows with precipitation and steeply with wind speed; damage is
/// impact relative to the coating's incubation threshold and the loss
/// approaches `max_loss` as damage accumulates.
#[derive(Debug, Clone, PartialEq)]
pub struct RainErosionModel {
    /// Wind speed at which impact equals precipitation (m/s)
    pub reference_wind_speed: f64,
    pub velocity_exponent: f64,
    /// Impact (mm-equivalent) at which damage reaches 1
    pub incubation: f64,
    /// Loss ceiling in percent
    pub max_loss: f64,
}

impl Default for RainErosionModel {
    fn default() -> Self {
        Self {
            reference_wind_speed: 10.0,
            velocity_exponent: 6.7,
            incubation: 20_000.0,
            max_loss: 5.0,
        }
    }
}

impl ErosionModel for RainErosionModel {
    fn annual_loss(&self, cumulative_precipitation: f64, wind_speed: f64) -> f64 {
        if cumulative_precipitation <= 0.0 || wind_speed <= 0.0 {
            return 0.0;
        }
        let relative_speed = wind_speed / self.reference_wind_speed;
        let impact = cumulative_precipitation * relative_speed.powf(self.velocity_exponent);
        let damage = impact / self.incubation;
        self.max_loss * (1.0 - (-damage).exp())
    }
}

pub(super) fn erosion_loss(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let precipitation = ctx.require(PRECIPITATION_SOURCE)?;
    let wind = ctx.require(WIND_SPEED_SOURCE)?;

    let mut bands = Vec::new();
    for &percentile in ctx.percentiles {
        // A percentile missing on either input is left out
        let rain = ctx.input_band(precipitation, percentile);
        let speed = ctx.input_band(wind, percentile);
        let (Some(rain), Some(speed)) = (rain, speed) else {
            continue;
        };

        let speed_by_year = speed.year_map();
        let losses: BTreeMap<i32, f64> = rain
            .data
            .iter()
            .filter_map(|p| {
                let speed = speed_by_year.get(&p.year)?;
                Some((p.year, ctx.erosion_model.annual_loss(p.value, *speed)))
            })
            .collect();
        bands.push(PercentileSeries::from_year_map(ctx.source_id, percentile, &losses));
    }

    ctx.add_audit_entry(
        "model",
        format!("erosion loss for {} percentiles", bands.len()),
        vec![PRECIPITATION_SOURCE.into(), WIND_SPEED_SOURCE.into()],
        AuditEntryType::Transformation,
        Some("erosionModel"),
    );
    Ok(TransformerOutput::Bands(bands))
}
