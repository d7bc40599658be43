//! Custom effect encoding.
//!
//! The device accepts a space-delimited frame list for `animType: custom`:
//! the total tile count, then per panel its id, frame count and frames of
//! `R G B W transitionTime`. Every segment ends with a space, including the
//! last one.
//!
//! Non-triangle panels hold their own color. Triangles hold the shared
//! friend color for an hour-scale frame, then fade out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::DeviceError;
use super::panels::{PanelId, PanelInventory};

/// Reserved key carrying the color for triangle panels.
pub const FRIEND_COLOR_KEY: &str = "fromFriendColor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);

    fn from_json(value: &Value) -> Option<Rgb> {
        let [r, g, b] = value.as_array()?.as_slice() else {
            return None;
        };
        let channel = |v: &Value| v.as_u64().and_then(|c| u8::try_from(c).ok());
        Some(Rgb(channel(r)?, channel(g)?, channel(b)?))
    }
}

/// Panel colors plus the optional friend color for triangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorAssignment {
    panels: BTreeMap<PanelId, Rgb>,
    friend_color: Option<Rgb>,
}

impl ColorAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `{"<panelId>": [r, g, b], ..., "fromFriendColor": [r, g, b]}`.
    pub fn from_json(payload: &Value) -> Result<Self, DeviceError> {
        let object = payload
            .as_object()
            .ok_or_else(|| DeviceError::InvalidCommand("expected a JSON object".to_string()))?;

        let mut assignment = ColorAssignment::new();
        for (key, value) in object {
            let rgb = Rgb::from_json(value).ok_or_else(|| {
                DeviceError::InvalidCommand(format!("{key}: expected [r, g, b] in 0..=255"))
            })?;
            if key == FRIEND_COLOR_KEY {
                assignment.friend_color = Some(rgb);
            } else {
                assignment.panels.insert(PanelId::new(key.as_str()), rgb);
            }
        }
        Ok(assignment)
    }

    pub fn with_panel(mut self, id: impl Into<PanelId>, rgb: Rgb) -> Self {
        self.panels.insert(id.into(), rgb);
        self
    }

    pub fn with_friend_color(mut self, rgb: Rgb) -> Self {
        self.friend_color = Some(rgb);
        self
    }

    /// Every listed panel and every triangle at one color.
    pub fn uniform(inventory: &PanelInventory, rgb: Rgb) -> Self {
        let panels = inventory.panels().iter().map(|id| (id.clone(), rgb)).collect();
        ColorAssignment {
            panels,
            friend_color: Some(rgb),
        }
    }

    pub fn panels(&self) -> impl Iterator<Item = (&PanelId, &Rgb)> {
        self.panels.iter()
    }

    pub fn friend_color(&self) -> Option<Rgb> {
        self.friend_color
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty() && self.friend_color.is_none()
    }
}

/// Builds the `animData` string. Assignment keys that are known triangles
/// are driven through the friend color only.
pub fn encode(assignment: &ColorAssignment, inventory: &PanelInventory) -> String {
    let frames: Vec<(&PanelId, &Rgb)> = assignment
        .panels()
        .filter(|(id, _)| !inventory.is_triangle(id))
        .collect();
    let triangles = inventory.triangles();

    let mut anim_data = format!("{} ", frames.len() + triangles.len());

    for (id, Rgb(r, g, b)) in frames {
        anim_data.push_str(&format!("{id} 2 0 0 0 0 30 {r} {g} {b} 0 50 "));
    }

    let Rgb(r, g, b) = assignment.friend_color().unwrap_or(Rgb::BLACK);
    for id in triangles {
        anim_data.push_str(&format!("{id} 2 {r} {g} {b} 0 3600 0 0 0 0 360 "));
    }

    anim_data
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectCommand {
    write: EffectWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct EffectWrite {
    command: &'static str,
    version: &'static str,
    anim_type: &'static str,
    anim_data: String,
    #[serde(rename = "loop")]
    looping: bool,
    palette: Vec<PaletteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct PaletteEntry {
    hue: u16,
}

impl EffectCommand {
    /// One-shot custom display envelope for `PUT /effects`.
    pub fn display(anim_data: String) -> Self {
        EffectCommand {
            write: EffectWrite {
                command: "display",
                version: "2.0",
                anim_type: "custom",
                anim_data,
                looping: false,
                palette: vec![PaletteEntry { hue: 0 }],
            },
        }
    }

    pub fn anim_data(&self) -> &str {
        &self.write.anim_data
    }
}
