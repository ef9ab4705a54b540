use serde::{Deserialize, Serialize};
use std::fmt;

/// A circle found by the Hough transform, in original image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Accumulator votes for the centre
    pub votes: u32,
}

impl Circle {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius, votes: 0 }
    }

    /// Centre rounded to the nearest pixel
    pub fn center(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }

    pub fn area(&self) -> f32 {
        std::f32::consts::PI * self.radius * self.radius
    }

    pub fn perimeter(&self) -> f32 {
        2.0 * std::f32::consts::PI * self.radius
    }

    /// `4πA / P²`, 1.0 for an ideal circle
    pub fn circularity(&self) -> f32 {
        let p = self.perimeter();
        if p == 0.0 {
            return 0.0;
        }
        4.0 * std::f32::consts::PI * self.area() / (p * p)
    }

    pub fn distance_to(&self, other: &Circle) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Coin denominations known to the classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinKind {
    Penny,
    Nickel,
    Dime,
    Quarter,
    OneDollar,
    Unknown,
}

impl CoinKind {
    /// Face value in cents
    pub fn cents(self) -> u32 {
        match self {
            CoinKind::Penny => 1,
            CoinKind::Nickel => 5,
            CoinKind::Dime => 10,
            CoinKind::Quarter => 25,
            CoinKind::OneDollar => 100,
            CoinKind::Unknown => 0,
        }
    }

    /// Text drawn next to the coin
    pub fn label(self) -> &'static str {
        match self {
            CoinKind::Penny => "1-cent",
            CoinKind::Nickel => "5-cents",
            CoinKind::Dime => "Dime",
            CoinKind::Quarter => "Quarter",
            CoinKind::OneDollar => "One Dollar",
            CoinKind::Unknown => "Unknown",
        }
    }

    /// Stable key used in pipeline metadata
    pub fn as_key(self) -> &'static str {
        match self {
            CoinKind::Penny => "penny",
            CoinKind::Nickel => "nickel",
            CoinKind::Dime => "dime",
            CoinKind::Quarter => "quarter",
            CoinKind::OneDollar => "one_dollar",
            CoinKind::Unknown => "unknown",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "penny" => Some(CoinKind::Penny),
            "nickel" => Some(CoinKind::Nickel),
            "dime" => Some(CoinKind::Dime),
            "quarter" => Some(CoinKind::Quarter),
            "one_dollar" => Some(CoinKind::OneDollar),
            "unknown" => Some(CoinKind::Unknown),
            _ => None,
        }
    }

    /// Group a template/reference file by the coin name in its filename.
    ///
    /// Matching is case-sensitive, mirroring how the template sets are named
    /// ("Dime_front.png", "penny-2.png", "one dollar.jpg").
    pub fn from_filename(name: &str) -> Option<Self> {
        if name.contains("Dime") {
            Some(CoinKind::Dime)
        } else if name.contains("Quarter") {
            Some(CoinKind::Quarter)
        } else if name.contains("Nickle") || name.contains("Nickel") {
            Some(CoinKind::Nickel)
        } else if name.contains("penny") || name.contains("Penn") {
            Some(CoinKind::Penny)
        } else if name.contains("one dollar") {
            Some(CoinKind::OneDollar)
        } else {
            None
        }
    }
}

impl fmt::Display for CoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified coin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinDetection {
    pub circle: Circle,
    /// `None` when the classifier left the coin unlabelled (ratio too small)
    pub kind: Option<CoinKind>,
    /// Match score in percent for template/feature classification
    pub score: Option<f32>,
}

impl CoinDetection {
    pub fn cents(&self) -> u32 {
        self.kind.map(CoinKind::cents).unwrap_or(0)
    }

    /// Label text as drawn on the overlay
    pub fn label(&self) -> Option<String> {
        let kind = self.kind?;
        Some(match self.score {
            Some(score) => format!("{} ({}%)", kind.label(), score as i32),
            None => kind.label().to_string(),
        })
    }
}

/// Running monetary total in integer cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub cents: u32,
}

impl Tally {
    pub fn add(&mut self, kind: CoinKind) {
        self.cents += kind.cents();
    }

    pub fn dollars(&self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl FromIterator<CoinKind> for Tally {
    fn from_iter<I: IntoIterator<Item = CoinKind>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for kind in iter {
            tally.add(kind);
        }
        tally
    }
}

/// Full result of one detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub run_id: uuid::Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: time::OffsetDateTime,
    pub variant: String,
    pub image_width: u32,
    pub image_height: u32,
    pub coins: Vec<CoinDetection>,
    pub total: Tally,
}

impl DetectionReport {
    pub fn new(variant: impl Into<String>, (image_width, image_height): (u32, u32), coins: Vec<CoinDetection>) -> Self {
        let total = coins.iter().filter_map(|c| c.kind).collect();
        Self {
            run_id: uuid::Uuid::new_v4(),
            generated_at: time::OffsetDateTime::now_utc(),
            variant: variant.into(),
            image_width,
            image_height,
            coins,
            total,
        }
    }

    /// Text drawn at the bottom of the annotated image
    pub fn total_text(&self) -> String {
        format!("Total Money: {}", self.total)
    }
}
