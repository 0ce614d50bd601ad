//! Load-time compilation of a [`RuleDefinition`] into a typed [`CompiledRule`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use safevision_core::{Point, RuleKind, Severity};

use super::{
    ApproachingParams, CollisionRiskParams, ConfigError, CrowdInZoneParams, DistanceBelowParams,
    FallDetectionParams, LineCrossParams, RuleDefinition, SafetyLine, SpeedOverParams, Zone,
    ZoneEntryParams,
};

/// A validated safety line reduced to its two endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSegment {
    pub id: String,
    pub name: String,
    pub start: Point,
    pub end: Point,
}

/// Tagged union over the eight rule kinds with their validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSpec {
    DistanceBelow(DistanceBelowParams),
    ZoneEntry { params: ZoneEntryParams, zone: Zone },
    SpeedOver(SpeedOverParams),
    CrowdInZone { params: CrowdInZoneParams, zone: Zone },
    LineCross { params: LineCrossParams, line: LineSegment },
    Approaching(ApproachingParams),
    CollisionRisk(CollisionRiskParams),
    FallDetection(FallDetectionParams),
}

impl RuleSpec {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleSpec::DistanceBelow(_) => RuleKind::DistanceBelow,
            RuleSpec::ZoneEntry { .. } => RuleKind::ZoneEntry,
            RuleSpec::SpeedOver(_) => RuleKind::SpeedOver,
            RuleSpec::CrowdInZone { .. } => RuleKind::CrowdInZone,
            RuleSpec::LineCross { .. } => RuleKind::LineCross,
            RuleSpec::Approaching(_) => RuleKind::Approaching,
            RuleSpec::CollisionRisk(_) => RuleKind::CollisionRisk,
            RuleSpec::FallDetection(_) => RuleKind::FallDetection,
        }
    }
}

/// A rule definition that passed validation and is ready to be instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub spec: RuleSpec,
}

impl CompiledRule {
    pub fn kind(&self) -> RuleKind {
        self.spec.kind()
    }
}

impl RuleDefinition {
    /// Parse the `type` field.
    pub fn kind(&self) -> Result<RuleKind, ConfigError> {
        self.rule_type
            .parse()
            .map_err(|_| ConfigError::UnknownType {
                rule_id: self.id.clone(),
                rule_type: self.rule_type.clone(),
            })
    }

    /// Validate the definition and resolve its typed parameters.
    ///
    /// Geometry may sit at the top level or inside `params`; the top-level
    /// copy wins.
    pub fn compile(&self) -> Result<CompiledRule, ConfigError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(invalid(id, "rule id must not be empty"));
        }

        let kind = self.kind()?;
        let (params, nested_zone, nested_line) = split_params(id, &self.params)?;
        let zone = self.zone.clone().or(nested_zone);
        let line = self.line.clone().or(nested_line);

        let spec = match kind {
            RuleKind::DistanceBelow => {
                let p: DistanceBelowParams = parse(id, params)?;
                non_negative(id, "min_distance", p.min_distance)?;
                non_negative(id, "duration", p.duration)?;
                RuleSpec::DistanceBelow(p)
            }
            RuleKind::ZoneEntry => {
                let p: ZoneEntryParams = parse(id, params)?;
                non_negative(id, "duration", p.duration)?;
                RuleSpec::ZoneEntry {
                    params: p,
                    zone: require_zone(id, kind, zone)?,
                }
            }
            RuleKind::SpeedOver => {
                let p: SpeedOverParams = parse(id, params)?;
                non_negative(id, "max_speed", p.max_speed)?;
                RuleSpec::SpeedOver(p)
            }
            RuleKind::CrowdInZone => {
                let p: CrowdInZoneParams = parse(id, params)?;
                if p.max_count == 0 {
                    return Err(invalid(id, "max_count must be at least 1"));
                }
                non_negative(id, "duration", p.duration)?;
                RuleSpec::CrowdInZone {
                    params: p,
                    zone: require_zone(id, kind, zone)?,
                }
            }
            RuleKind::LineCross => {
                let p: LineCrossParams = parse(id, params)?;
                RuleSpec::LineCross {
                    params: p,
                    line: require_line(id, kind, line)?,
                }
            }
            RuleKind::Approaching => {
                let p: ApproachingParams = parse(id, params)?;
                non_negative(id, "duration", p.duration)?;
                RuleSpec::Approaching(p)
            }
            RuleKind::CollisionRisk => {
                let p: CollisionRiskParams = parse(id, params)?;
                non_negative(id, "min_distance", p.min_distance)?;
                if p.person_label.trim().is_empty() {
                    return Err(invalid(id, "person_label must not be empty"));
                }
                RuleSpec::CollisionRisk(p)
            }
            RuleKind::FallDetection => {
                let p: FallDetectionParams = parse(id, params)?;
                non_negative(id, "min_fall_pixels", p.min_fall_pixels)?;
                non_negative(id, "pre_duration", p.pre_duration)?;
                non_negative(id, "post_duration", p.post_duration)?;
                if let Some(window) = p.active_frames {
                    if window.start > window.end {
                        return Err(invalid(
                            id,
                            format!(
                                "active_frames start ({}) is after end ({})",
                                window.start, window.end
                            ),
                        ));
                    }
                }
                RuleSpec::FallDetection(p)
            }
        };

        Ok(CompiledRule {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            description: self.description.clone(),
            severity: self.severity,
            spec,
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn invalid(rule_id: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        rule_id: rule_id.to_string(),
        message: message.into(),
    }
}

/// Pull embedded `zone` / `line` out of `params`, leaving only kind fields.
fn split_params(
    rule_id: &str,
    params: &Value,
) -> Result<(Value, Option<Zone>, Option<SafetyLine>), ConfigError> {
    let mut map = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(ConfigError::InvalidParams {
                rule_id: rule_id.to_string(),
                message: format!("params must be an object, got {other}"),
            })
        }
    };

    let zone = match map.remove("zone") {
        Some(v) => Some(serde_json::from_value::<Zone>(v).map_err(|e| {
            ConfigError::InvalidGeometry {
                rule_id: rule_id.to_string(),
                message: format!("zone: {e}"),
            }
        })?),
        None => None,
    };
    let line = match map.remove("line") {
        Some(v) => Some(serde_json::from_value::<SafetyLine>(v).map_err(|e| {
            ConfigError::InvalidGeometry {
                rule_id: rule_id.to_string(),
                message: format!("line: {e}"),
            }
        })?),
        None => None,
    };

    Ok((Value::Object(map), zone, line))
}

fn parse<T: DeserializeOwned>(rule_id: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::InvalidParams {
        rule_id: rule_id.to_string(),
        message: e.to_string(),
    })
}

fn non_negative(rule_id: &str, field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(
            rule_id,
            format!("{field} must be a finite non-negative number, got {value}"),
        ))
    }
}

fn finite_point(p: &Point) -> bool {
    p.0.is_finite() && p.1.is_finite()
}

fn require_zone(rule_id: &str, kind: RuleKind, zone: Option<Zone>) -> Result<Zone, ConfigError> {
    let zone = zone.ok_or_else(|| ConfigError::MissingGeometry {
        rule_id: rule_id.to_string(),
        kind,
        geometry: "zone",
    })?;
    if zone.polygon.len() < 3 {
        return Err(ConfigError::InvalidGeometry {
            rule_id: rule_id.to_string(),
            message: format!(
                "zone '{}' polygon needs at least 3 points, got {}",
                zone.id,
                zone.polygon.len()
            ),
        });
    }
    if !zone.polygon.iter().all(finite_point) {
        return Err(ConfigError::InvalidGeometry {
            rule_id: rule_id.to_string(),
            message: format!("zone '{}' polygon has non-finite coordinates", zone.id),
        });
    }
    Ok(zone)
}

fn require_line(
    rule_id: &str,
    kind: RuleKind,
    line: Option<SafetyLine>,
) -> Result<LineSegment, ConfigError> {
    let line = line.ok_or_else(|| ConfigError::MissingGeometry {
        rule_id: rule_id.to_string(),
        kind,
        geometry: "line",
    })?;
    match line.points.as_slice() {
        [start, end] if finite_point(start) && finite_point(end) => Ok(LineSegment {
            id: line.id.clone(),
            name: line.name.clone(),
            start: *start,
            end: *end,
        }),
        [_, _] => Err(ConfigError::InvalidGeometry {
            rule_id: rule_id.to_string(),
            message: format!("line '{}' has non-finite coordinates", line.id),
        }),
        points => Err(ConfigError::InvalidGeometry {
            rule_id: rule_id.to_string(),
            message: format!(
                "line '{}' needs exactly 2 points, got {}",
                line.id,
                points.len()
            ),
        }),
    }
}
