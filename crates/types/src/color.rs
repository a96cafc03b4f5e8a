use serde::{Deserialize, Deserializer, Serialize, de};
use std::hash::{Hash, Hasher};

fn default_one() -> f32 {
    1.0
}

fn is_one(num: &f32) -> bool {
    *num == 1.0
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(skip_serializing_if = "is_one", default = "default_one")]
    pub a: f32,
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.r.hash(state);
        self.g.hash(state);
        self.b.hash(state);
        self.a.to_bits().hash(state);
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 1.0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 1.0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn gray(value: u8) -> Self {
        Self::rgb(value, value, value)
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    /// Components scaled to `0.0..=1.0`, the form `\definecolor{..}{rgb}` expects.
    pub fn unit_rgb(&self) -> (f64, f64, f64) {
        (
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        )
    }

    /// Parse a hex color string (#RGB or #RRGGBB format)
    pub fn parse_hex(s: &str) -> Result<Color, String> {
        let s = s.trim();
        let Some(hex) = s.strip_prefix('#') else {
            return Err(format!("Color must start with #, got: {}", s));
        };
        let channel = |digits: &str, name: &str| {
            u8::from_str_radix(digits, 16).map_err(|e| format!("Invalid {} component: {}", name, e))
        };
        match hex.len() {
            3 => Ok(Color::rgb(
                channel(&hex[0..1].repeat(2), "red")?,
                channel(&hex[1..2].repeat(2), "green")?,
                channel(&hex[2..3].repeat(2), "blue")?,
            )),
            6 => Ok(Color::rgb(
                channel(&hex[0..2], "red")?,
                channel(&hex[2..4], "green")?,
                channel(&hex[4..6], "blue")?,
            )),
            _ => Err(format!("Invalid hex color length: expected 3 or 6, got {}", hex.len())),
        }
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ColorDef {
            Str(String),
            Map { r: u8, g: u8, b: u8, #[serde(default = "default_one")] a: f32 },
        }

        match ColorDef::deserialize(deserializer)? {
            ColorDef::Str(s) => Self::parse_hex(&s).map_err(de::Error::custom),
            ColorDef::Map { r, g, b, a } => Ok(Color { r, g, b, a }),
        }
    }
}
