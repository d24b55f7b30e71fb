// operator.rs — terrain operator selection.
//
// The caller hands the engine a command plus an optional algorithm string
// (`OperatorSelection`). Resolution into the closed `Operator` set happens
// at dispatch time: an unknown pairing is reported as
// `Error::UnsupportedOperation` before any device work starts.
//
// Adding an operator means one new `Operator` variant, one formula in
// stencil.rs and one branch in shaders/stencil.wgsl. The dispatch engine
// in block.rs never changes.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A terrain command family as named on a command line or in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Slope,
    Hillshade,
    Aspect,
    TotalCurvature,
    PlanCurvature,
    ProfileCurvature,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Slope,
        Command::Hillshade,
        Command::Aspect,
        Command::TotalCurvature,
        Command::PlanCurvature,
        Command::ProfileCurvature,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Slope => "slope",
            Command::Hillshade => "hillshade",
            Command::Aspect => "aspect",
            Command::TotalCurvature => "total_curvature",
            Command::PlanCurvature => "plan_curvature",
            Command::ProfileCurvature => "profile_curvature",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = Error;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Command::ALL
            .into_iter()
            .find(|c| c.name() == key)
            .ok_or_else(|| Error::UnsupportedOperation { command: s.to_string(), algorithm: None })
    }
}

// ---------------------------------------------------------------------------
// Slope algorithm
// ---------------------------------------------------------------------------

/// The two slope formulas the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlopeAlgorithm {
    /// Burrough & McDonnell (Horn's weighted 3x3 differences).
    Burrough,
    /// Zevenbergen & Thorne (4-neighbour central differences).
    Zevenbergen,
}

impl SlopeAlgorithm {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "burrough" | "horn" => Some(SlopeAlgorithm::Burrough),
            "zevenbergen" | "zevenbergen-thorne" | "zevenbergen_thorne" => {
                Some(SlopeAlgorithm::Zevenbergen)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// One variant per registered neighbourhood formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    SlopeBurrough,
    SlopeZevenbergen,
    Hillshade,
    Aspect,
    TotalCurvature,
    PlanCurvature,
    ProfileCurvature,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::SlopeBurrough,
        Operator::SlopeZevenbergen,
        Operator::Hillshade,
        Operator::Aspect,
        Operator::TotalCurvature,
        Operator::PlanCurvature,
        Operator::ProfileCurvature,
    ];

    /// Identifier baked into the WGSL kernel. Must match the `switch` in
    /// `shaders/stencil.wgsl`.
    pub fn kernel_id(self) -> u32 {
        match self {
            Operator::SlopeBurrough => 0,
            Operator::SlopeZevenbergen => 1,
            Operator::Hillshade => 2,
            Operator::Aspect => 3,
            Operator::TotalCurvature => 4,
            Operator::PlanCurvature => 5,
            Operator::ProfileCurvature => 6,
        }
    }

    pub fn command(self) -> Command {
        match self {
            Operator::SlopeBurrough | Operator::SlopeZevenbergen => Command::Slope,
            Operator::Hillshade => Command::Hillshade,
            Operator::Aspect => Command::Aspect,
            Operator::TotalCurvature => Command::TotalCurvature,
            Operator::PlanCurvature => Command::PlanCurvature,
            Operator::ProfileCurvature => Command::ProfileCurvature,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::SlopeBurrough => write!(f, "slope (burrough)"),
            Operator::SlopeZevenbergen => write!(f, "slope (zevenbergen)"),
            other => write!(f, "{}", other.command()),
        }
    }
}

// ---------------------------------------------------------------------------
// OperatorSelection
// ---------------------------------------------------------------------------

/// An unresolved operator request: command plus optional algorithm string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSelection {
    pub command: Command,
    pub algorithm: Option<String>,
}

impl OperatorSelection {
    pub fn new(command: Command) -> Self {
        OperatorSelection { command, algorithm: None }
    }

    pub fn with_algorithm(command: Command, algorithm: impl Into<String>) -> Self {
        OperatorSelection { command, algorithm: Some(algorithm.into()) }
    }

    /// Map the selection onto the closed operator set.
    ///
    /// Slope without an algorithm resolves to Burrough. Any algorithm string
    /// on a command that has no variants is rejected.
    pub fn resolve(&self) -> Result<Operator> {
        let unsupported = || Error::UnsupportedOperation {
            command: self.command.to_string(),
            algorithm: self.algorithm.clone(),
        };

        match (self.command, self.algorithm.as_deref()) {
            (Command::Slope, None) => Ok(Operator::SlopeBurrough),
            (Command::Slope, Some(name)) => match SlopeAlgorithm::parse(name) {
                Some(SlopeAlgorithm::Burrough) => Ok(Operator::SlopeBurrough),
                Some(SlopeAlgorithm::Zevenbergen) => Ok(Operator::SlopeZevenbergen),
                None => Err(unsupported()),
            },
            (_, Some(_)) => Err(unsupported()),
            (Command::Hillshade, None) => Ok(Operator::Hillshade),
            (Command::Aspect, None) => Ok(Operator::Aspect),
            (Command::TotalCurvature, None) => Ok(Operator::TotalCurvature),
            (Command::PlanCurvature, None) => Ok(Operator::PlanCurvature),
            (Command::ProfileCurvature, None) => Ok(Operator::ProfileCurvature),
        }
    }
}

impl From<Command> for OperatorSelection {
    fn from(command: Command) -> Self {
        OperatorSelection::new(command)
    }
}

impl From<Operator> for OperatorSelection {
    fn from(op: Operator) -> Self {
        match op {
            Operator::SlopeBurrough => OperatorSelection::with_algorithm(Command::Slope, "burrough"),
            Operator::SlopeZevenbergen => {
                OperatorSelection::with_algorithm(Command::Slope, "zevenbergen")
            }
            other => OperatorSelection::new(other.command()),
        }
    }
}

impl fmt::Display for OperatorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.algorithm {
            Some(a) => write!(f, "{} ({a})", self.command),
            None => write!(f, "{}", self.command),
        }
    }
}
