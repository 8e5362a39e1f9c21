//! Parameter surface of an instancer node and its validation boundary.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Raised when a parameter edit cannot be accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("instance spacing must be a finite number greater than zero, got {0}")]
    InvalidSpacing(f64),
    #[error("unknown value `{value}` for parameter `{param}`")]
    UnknownVariant { param: ParamKind, value: String },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("parameter `{param}` expects {expected}")]
    WrongType {
        param: ParamKind,
        expected: &'static str,
    },
}

/// How the target population is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InstancingMode {
    /// Population is the user count.
    #[default]
    Count,
    /// Population follows curve length divided by spacing.
    Distance,
}

impl InstancingMode {
    pub fn from_index(index: i64) -> Result<Self, ParamError> {
        match index {
            0 => Ok(Self::Count),
            1 => Ok(Self::Distance),
            other => Err(ParamError::UnknownVariant {
                param: ParamKind::InstancingMode,
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn index(self) -> i64 {
        match self {
            Self::Count => 0,
            Self::Distance => 1,
        }
    }
}

impl FromStr for InstancingMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "distance" => Ok(Self::Distance),
            other => other
                .parse::<i64>()
                .ok()
                .map_or_else(
                    || {
                        Err(ParamError::UnknownVariant {
                            param: ParamKind::InstancingMode,
                            value: s.to_owned(),
                        })
                    },
                    Self::from_index,
                ),
        }
    }
}

/// Display type forced onto every managed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DisplayType {
    Normal,
    Template,
    #[default]
    Reference,
}

impl DisplayType {
    pub fn from_index(index: i64) -> Result<Self, ParamError> {
        match index {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Template),
            2 => Ok(Self::Reference),
            other => Err(ParamError::UnknownVariant {
                param: ParamKind::DisplayType,
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn index(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Template => 1,
            Self::Reference => 2,
        }
    }
}

impl FromStr for DisplayType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "template" => Ok(Self::Template),
            "reference" => Ok(Self::Reference),
            other => other
                .parse::<i64>()
                .ok()
                .map_or_else(
                    || {
                        Err(ParamError::UnknownVariant {
                            param: ParamKind::DisplayType,
                            value: s.to_owned(),
                        })
                    },
                    Self::from_index,
                ),
        }
    }
}

/// Display override flags mirrored onto each instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DisplayOverrides {
    pub enabled: bool,
    pub display_type: DisplayType,
    pub use_bounding_box_lod: bool,
}

/// Names of the user-tunable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ParamKind {
    InstancingMode,
    InstanceCount,
    InstanceSpacing,
    MaxInstancesByLength,
    DisplayType,
    UseBoundingBoxLod,
}

impl ParamKind {
    pub const ALL: [Self; 6] = [
        Self::InstancingMode,
        Self::InstanceCount,
        Self::InstanceSpacing,
        Self::MaxInstancesByLength,
        Self::DisplayType,
        Self::UseBoundingBoxLod,
    ];

    /// Attribute name as stored on the node.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InstancingMode => "instancingMode",
            Self::InstanceCount => "instanceCount",
            Self::InstanceSpacing => "instanceSpacing",
            Self::MaxInstancesByLength => "maxInstancesByLength",
            Self::DisplayType => "displayType",
            Self::UseBoundingBoxLod => "useBoundingBoxLOD",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ParamError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ParamError::UnknownParameter(name.to_owned()))
    }

    /// Edits to these parameters must be pushed onto every instance.
    #[must_use]
    pub const fn affects_overrides(self) -> bool {
        matches!(self, Self::DisplayType | Self::UseBoundingBoxLod)
    }

    /// Whether the parameter has any effect under `mode`. Editors dim the rest.
    #[must_use]
    pub const fn is_relevant(self, mode: InstancingMode) -> bool {
        match self {
            Self::InstanceCount => matches!(mode, InstancingMode::Count),
            Self::InstanceSpacing | Self::MaxInstancesByLength => {
                matches!(mode, InstancingMode::Distance)
            }
            Self::InstancingMode | Self::DisplayType | Self::UseBoundingBoxLod => true,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Untyped value coming from an editor or a script binding.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl ParamValue {
    fn as_integer(&self, param: ParamKind) -> Result<i64, ParamError> {
        match self {
            Self::Integer(value) => Ok(*value),
            Self::Number(value) if value.is_finite() => Ok(value.trunc() as i64),
            Self::Boolean(value) => Ok(i64::from(*value)),
            Self::Text(text) => text.trim().parse().map_err(|_| ParamError::WrongType {
                param,
                expected: "an integer",
            }),
            Self::Number(_) => Err(ParamError::WrongType {
                param,
                expected: "an integer",
            }),
        }
    }

    fn as_number(&self, param: ParamKind) -> Result<f64, ParamError> {
        match self {
            Self::Integer(value) => Ok(*value as f64),
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text.trim().parse().map_err(|_| ParamError::WrongType {
                param,
                expected: "a number",
            }),
            Self::Boolean(_) => Err(ParamError::WrongType {
                param,
                expected: "a number",
            }),
        }
    }

    fn as_boolean(&self, param: ParamKind) -> Result<bool, ParamError> {
        match self {
            Self::Boolean(value) => Ok(*value),
            Self::Integer(value) => Ok(*value != 0),
            Self::Number(value) => Ok(*value != 0.0),
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Ok(true),
                "false" | "off" | "0" => Ok(false),
                _ => Err(ParamError::WrongType {
                    param,
                    expected: "a boolean",
                }),
            },
        }
    }
}

/// Validated instancer parameters.
///
/// Fields are private so every edit goes through a setter; the resolver and
/// reconciler can rely on `instance_spacing >= MIN_SPACING`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstancerParams {
    mode: InstancingMode,
    instance_count: u32,
    instance_spacing: f64,
    max_instances_by_length: u32,
    display_type: DisplayType,
    use_bounding_box_lod: bool,
}

impl Default for InstancerParams {
    fn default() -> Self {
        Self {
            mode: InstancingMode::Count,
            instance_count: 5,
            instance_spacing: 1.0,
            max_instances_by_length: 50,
            display_type: DisplayType::Reference,
            use_bounding_box_lod: false,
        }
    }
}

impl InstancerParams {
    /// Smallest spacing accepted in distance mode.
    pub const MIN_SPACING: f64 = 0.01;

    #[must_use]
    pub const fn mode(&self) -> InstancingMode {
        self.mode
    }

    #[must_use]
    pub const fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[must_use]
    pub const fn instance_spacing(&self) -> f64 {
        self.instance_spacing
    }

    #[must_use]
    pub const fn max_instances_by_length(&self) -> u32 {
        self.max_instances_by_length
    }

    #[must_use]
    pub const fn display_type(&self) -> DisplayType {
        self.display_type
    }

    #[must_use]
    pub const fn use_bounding_box_lod(&self) -> bool {
        self.use_bounding_box_lod
    }

    /// Override state broadcast to the managed instances.
    #[must_use]
    pub const fn overrides(&self) -> DisplayOverrides {
        DisplayOverrides {
            enabled: true,
            display_type: self.display_type,
            use_bounding_box_lod: self.use_bounding_box_lod,
        }
    }

    pub fn set_mode(&mut self, mode: InstancingMode) {
        self.mode = mode;
    }

    /// Negative counts clamp to zero.
    pub fn set_instance_count(&mut self, count: i64) {
        self.instance_count = clamp_count(count);
    }

    /// Rejects non-finite or non-positive spacing and clamps small values up
    /// to [`Self::MIN_SPACING`].
    pub fn set_instance_spacing(&mut self, spacing: f64) -> Result<(), ParamError> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(ParamError::InvalidSpacing(spacing));
        }
        self.instance_spacing = spacing.max(Self::MIN_SPACING);
        Ok(())
    }

    pub fn set_max_instances_by_length(&mut self, max: i64) {
        self.max_instances_by_length = clamp_count(max);
    }

    pub fn set_display_type(&mut self, display_type: DisplayType) {
        self.display_type = display_type;
    }

    pub fn set_use_bounding_box_lod(&mut self, enabled: bool) {
        self.use_bounding_box_lod = enabled;
    }

    /// Apply an untyped edit. Returns `true` if the stored value changed.
    pub fn apply(&mut self, kind: ParamKind, value: &ParamValue) -> Result<bool, ParamError> {
        let before = *self;
        match kind {
            ParamKind::InstancingMode => {
                let mode = match value {
                    ParamValue::Text(text) => text.parse()?,
                    other => InstancingMode::from_index(other.as_integer(kind)?)?,
                };
                self.set_mode(mode);
            }
            ParamKind::InstanceCount => self.set_instance_count(value.as_integer(kind)?),
            ParamKind::InstanceSpacing => self.set_instance_spacing(value.as_number(kind)?)?,
            ParamKind::MaxInstancesByLength => {
                self.set_max_instances_by_length(value.as_integer(kind)?);
            }
            ParamKind::DisplayType => {
                let display_type = match value {
                    ParamValue::Text(text) => text.parse()?,
                    other => DisplayType::from_index(other.as_integer(kind)?)?,
                };
                self.set_display_type(display_type);
            }
            ParamKind::UseBoundingBoxLod => {
                self.set_use_bounding_box_lod(value.as_boolean(kind)?);
            }
        }
        Ok(*self != before)
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
