//! Failures, repairs, and external reliability drivers.
//!
//! External events come in five unrelated kinds (excavation activity,
//! lightning strikes, heatwaves, coldwaves, floods), each with its own id
//! space. A link from an event to a cable subsection is a discriminated
//! reference ([`EventRef`]: kind tag plus id), resolved and validated by the
//! registry rather than by a storage-level foreign key.
//!
//! Event durations are derived from the time window on every access and are
//! never stored.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::spatial::{Geometry, GeometryKind, Spatial, SpatialAttribute, Srid};
use crate::units::Celsius;
use crate::{EventId, EventLinkId, FailureId, SubsectionId};

// =============================================================================
// Time windows
// =============================================================================

/// Closed date interval `[start, end]`; an instant has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WindowRow")]
pub struct TimeWindow {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct WindowRow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<WindowRow> for TimeWindow {
    type Error = GridError;

    fn try_from(row: WindowRow) -> Result<Self, Self::Error> {
        TimeWindow::new(row.start, row.end)
    }
}

impl TimeWindow {
    /// Fails with [`GridError::InvalidWindow`] when `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> GridResult<Self> {
        if end < start {
            return Err(GridError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn instant(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `end - start`
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

// =============================================================================
// Failures and repairs
// =============================================================================

/// A recorded cable fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub id: FailureId,
    pub subsection: SubsectionId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub failure_type: Option<String>,
    #[serde(default)]
    pub failure_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
}

impl Failure {
    pub fn new(id: FailureId, subsection: SubsectionId) -> Self {
        Self {
            id,
            subsection,
            date: None,
            failure_type: None,
            failure_cause: None,
            location: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn classified(mut self, failure_type: impl Into<String>, cause: impl Into<String>) -> Self {
        self.failure_type = Some(failure_type.into());
        self.failure_cause = Some(cause.into());
        self
    }

    pub fn at(mut self, location: Geometry) -> Self {
        self.location = Some(location);
        self
    }
}

impl Spatial for Failure {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("failure location", GeometryKind::Point, Some(Srid::WGS84));

    fn geometry(&self) -> Option<&Geometry> {
        self.location.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.location.as_mut()
    }
}

/// A repair action: the composite key is its whole identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Repair {
    pub failure: FailureId,
    pub failed_section: SubsectionId,
    pub repair_section: SubsectionId,
}

impl Repair {
    pub fn new(
        failure: FailureId,
        failed_section: SubsectionId,
        repair_section: SubsectionId,
    ) -> Self {
        Self {
            failure,
            failed_section,
            repair_section,
        }
    }

    pub fn touches(&self, subsection: SubsectionId) -> bool {
        self.failed_section == subsection || self.repair_section == subsection
    }
}

impl std::fmt::Display for Repair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(failure {}, failed {}, repairing {})",
            self.failure, self.failed_section, self.repair_section
        )
    }
}

// =============================================================================
// External events
// =============================================================================

/// Discriminant of the five external event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Digging,
    Lightning,
    Heatwave,
    Coldwave,
    Flood,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Digging,
        EventKind::Lightning,
        EventKind::Heatwave,
        EventKind::Coldwave,
        EventKind::Flood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Digging => "digging",
            EventKind::Lightning => "lightning",
            EventKind::Heatwave => "heatwave",
            EventKind::Coldwave => "coldwave",
            EventKind::Flood => "flood",
        }
    }

    /// Table holding events of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EventKind::Digging => "digging_activity",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| GridError::Parse(format!("unknown event kind '{}'", s)))
    }
}

/// Discriminated reference to an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRef {
    pub kind: EventKind,
    pub id: EventId,
}

impl EventRef {
    pub fn new(kind: EventKind, id: EventId) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Excavation work near buried cables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiggingActivity {
    pub id: EventId,
    pub period: TimeWindow,
    #[serde(default)]
    pub utility_type: Option<String>,
    #[serde(default)]
    pub utility_type_other: Option<String>,
    #[serde(default)]
    pub digging_type: Option<String>,
    #[serde(default)]
    pub digging_type_other: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Geometry>,
    /// Whether the contractor asked for cable route details beforehand
    #[serde(default)]
    pub cable_details_requested: bool,
}

impl DiggingActivity {
    pub fn new(id: EventId, period: TimeWindow) -> Self {
        Self {
            id,
            period,
            utility_type: None,
            utility_type_other: None,
            digging_type: None,
            digging_type_other: None,
            area: None,
            cable_details_requested: false,
        }
    }

    pub fn with_area(mut self, area: Geometry) -> Self {
        self.area = Some(area);
        self
    }
}

impl Spatial for DiggingActivity {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("digging area", GeometryKind::Polygon, None);

    fn geometry(&self) -> Option<&Geometry> {
        self.area.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.area.as_mut()
    }
}

/// A lightning strike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lightning {
    pub id: EventId,
    pub impact_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geometry>,
}

impl Spatial for Lightning {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("lightning location", GeometryKind::Point, None);

    fn geometry(&self) -> Option<&Geometry> {
        self.location.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.location.as_mut()
    }
}

/// A heatwave or coldwave episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureWave {
    pub id: EventId,
    pub window: TimeWindow,
    #[serde(default)]
    pub max_temperature: Option<Celsius>,
    #[serde(default)]
    pub min_temperature: Option<Celsius>,
    #[serde(default)]
    pub average_temperature: Option<Celsius>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Geometry>,
}

impl TemperatureWave {
    pub fn new(id: EventId, window: TimeWindow) -> Self {
        Self {
            id,
            window,
            max_temperature: None,
            min_temperature: None,
            average_temperature: None,
            area: None,
        }
    }

    pub fn with_temperatures(mut self, min: f64, avg: f64, max: f64) -> Self {
        self.min_temperature = Some(Celsius(min));
        self.average_temperature = Some(Celsius(avg));
        self.max_temperature = Some(Celsius(max));
        self
    }

    pub fn with_area(mut self, area: Geometry) -> Self {
        self.area = Some(area);
        self
    }
}

impl Spatial for TemperatureWave {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("temperature wave area", GeometryKind::MultiPolygon, None);

    fn geometry(&self) -> Option<&Geometry> {
        self.area.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.area.as_mut()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flood {
    pub id: EventId,
    pub window: TimeWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Geometry>,
}

impl Spatial for Flood {
    const GEOMETRY: SpatialAttribute =
        SpatialAttribute::new("flood area", GeometryKind::MultiPolygon, None);

    fn geometry(&self) -> Option<&Geometry> {
        self.area.as_ref()
    }

    fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.area.as_mut()
    }
}

/// An external reliability driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalEvent {
    Digging(DiggingActivity),
    Lightning(Lightning),
    Heatwave(TemperatureWave),
    Coldwave(TemperatureWave),
    Flood(Flood),
}

impl ExternalEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExternalEvent::Digging(_) => EventKind::Digging,
            ExternalEvent::Lightning(_) => EventKind::Lightning,
            ExternalEvent::Heatwave(_) => EventKind::Heatwave,
            ExternalEvent::Coldwave(_) => EventKind::Coldwave,
            ExternalEvent::Flood(_) => EventKind::Flood,
        }
    }

    pub fn id(&self) -> EventId {
        match self {
            ExternalEvent::Digging(e) => e.id,
            ExternalEvent::Lightning(e) => e.id,
            ExternalEvent::Heatwave(e) | ExternalEvent::Coldwave(e) => e.id,
            ExternalEvent::Flood(e) => e.id,
        }
    }

    pub fn event_ref(&self) -> EventRef {
        EventRef::new(self.kind(), self.id())
    }

    /// Period during which the event acted; lightning is an instant.
    pub fn window(&self) -> TimeWindow {
        match self {
            ExternalEvent::Digging(e) => e.period,
            ExternalEvent::Lightning(e) => TimeWindow::instant(e.impact_date),
            ExternalEvent::Heatwave(e) | ExternalEvent::Coldwave(e) => e.window,
            ExternalEvent::Flood(e) => e.window,
        }
    }

    /// Derived duration of weather episodes (heatwave, coldwave, flood).
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ExternalEvent::Heatwave(e) | ExternalEvent::Coldwave(e) => Some(e.window.duration()),
            ExternalEvent::Flood(e) => Some(e.window.duration()),
            ExternalEvent::Digging(_) | ExternalEvent::Lightning(_) => None,
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            ExternalEvent::Digging(e) => e.geometry(),
            ExternalEvent::Lightning(e) => e.geometry(),
            ExternalEvent::Heatwave(e) | ExternalEvent::Coldwave(e) => e.geometry(),
            ExternalEvent::Flood(e) => e.geometry(),
        }
    }

    pub(crate) fn conform_geometry(&mut self) -> GridResult<()> {
        match self {
            ExternalEvent::Digging(e) => e.conform_geometry(),
            ExternalEvent::Lightning(e) => e.conform_geometry(),
            ExternalEvent::Heatwave(e) | ExternalEvent::Coldwave(e) => e.conform_geometry(),
            ExternalEvent::Flood(e) => e.conform_geometry(),
        }
    }
}

// =============================================================================
// Links
// =============================================================================

/// "This event affects this subsection."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLink {
    pub id: EventLinkId,
    pub subsection: SubsectionId,
    pub event: EventRef,
}

impl EventLink {
    pub fn new(id: EventLinkId, subsection: SubsectionId, event: EventRef) -> Self {
        Self {
            id,
            subsection,
            event,
        }
    }
}

/// Junction row: a digging activity touched a subsection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiggingImpact {
    pub digging: EventId,
    pub subsection: SubsectionId,
}

/// Junction row: a failure is attributed to a digging activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureAttribution {
    pub digging: EventId,
    pub failure: FailureId,
}
