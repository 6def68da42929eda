//! Market session classifier.
//!
//! Windows are checked in table order against the bar's UTC time of day;
//! bounds are inclusive and a window whose end precedes its start wraps
//! past midnight. First match wins.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SessionConfig};
use crate::domain::Bar;
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLabel {
    /// 1-based position in the window table.
    pub id: usize,
    pub name: String,
    pub trade_allowed: bool,
}

#[derive(Debug, Clone)]
struct Window {
    name: String,
    start: NaiveTime,
    end: NaiveTime,
    trade: bool,
}

impl Window {
    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionClassifier {
    windows: Vec<Window>,
}

impl SessionClassifier {
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let windows = config
            .windows
            .iter()
            .map(|w| {
                let (start, end) = w.bounds()?;
                Ok(Window {
                    name: w.name.clone(),
                    start,
                    end,
                    trade: w.trade,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { windows })
    }

    pub fn classify(&self, at: DateTime<Utc>) -> Option<SessionLabel> {
        let t = at.time().with_nanosecond(0).unwrap_or_else(|| at.time());
        self.windows
            .iter()
            .enumerate()
            .find(|(_, w)| w.contains(t))
            .map(|(i, w)| SessionLabel {
                id: i + 1,
                name: w.name.clone(),
                trade_allowed: w.trade,
            })
    }
}

impl FeatureIndicator for SessionClassifier {
    type Output = Option<SessionLabel>;

    fn name(&self) -> &str {
        "sessions"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<SessionLabel>> {
        bars.iter().map(|b| self.classify(b.timestamp)).collect()
    }
}
