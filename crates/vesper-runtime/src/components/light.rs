//! The `Light` component and its scene helper.

use std::any::Any;
use std::rc::Rc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use vesper_ecs::component::{Component, FrameContext};
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::{SceneHost, Transform};
use vesper_ecs::ComponentError;

use super::HelperObject;

/// Scene object kind used for light helpers.
pub const LIGHT_HELPER_KIND: &str = "light-helper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightType {
    #[default]
    Point,
    Directional,
    Spot,
    Ambient,
}

impl LightType {
    /// Ambient light has no position, so it gets no helper.
    fn has_helper(self) -> bool {
        self != LightType::Ambient
    }
}

/// Saved / init form of a Light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LightData {
    pub light_type: LightType,
    /// `#rrggbb`.
    pub color: String,
    pub intensity: f32,
    /// Range of point and spot lights; `0` means unlimited.
    pub distance: f32,
    /// Spot cone angle in radians.
    pub angle: f32,
    pub cast_shadow: bool,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: "#ffffff".to_owned(),
            intensity: 1.0,
            distance: 0.0,
            angle: std::f32::consts::FRAC_PI_3,
            cast_shadow: false,
        }
    }
}

impl LightData {
    fn validate(&self) -> Result<(), ComponentError> {
        parse_hex_color(&self.color)?;
        if self.intensity < 0.0 || self.distance < 0.0 {
            return Err(ComponentError::InvalidData(
                "light intensity and distance must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// `color` as RGB channels in `0..=1`.
    pub fn rgb(&self) -> Result<Vec3, ComponentError> {
        parse_hex_color(&self.color)
    }
}

fn parse_hex_color(color: &str) -> Result<Vec3, ComponentError> {
    let invalid = || ComponentError::InvalidData(format!("invalid light color '{color}'"));
    let hex = color.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 {
        return Err(invalid());
    }
    let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
    let channel = |shift: u32| ((value >> shift) & 0xff) as f32 / 255.0;
    Ok(Vec3::new(channel(16), channel(8), channel(0)))
}

pub struct Light {
    entity: EntityId,
    data: LightData,
    helper: HelperObject,
}

impl Light {
    pub fn new(
        entity: EntityId,
        data: LightData,
        scene: Rc<dyn SceneHost>,
    ) -> Result<Self, ComponentError> {
        data.validate()?;
        let mut light = Self {
            entity,
            data,
            helper: HelperObject::new(scene, LIGHT_HELPER_KIND, "light"),
        };
        if light.data.light_type.has_helper() {
            light.helper.create(entity)?;
        }
        light.sync();
        Ok(light)
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn data(&self) -> &LightData {
        &self.data
    }

    pub fn helper(&self) -> Option<EntityId> {
        self.helper.id()
    }

    /// Replace every field. Switching to or from `ambient` removes or
    /// recreates the helper.
    pub fn set_data(&mut self, data: LightData) -> Result<(), ComponentError> {
        data.validate()?;
        self.data = data;
        if self.data.light_type.has_helper() {
            self.helper.create(self.entity)?;
        } else {
            self.helper.destroy();
        }
        self.sync();
        Ok(())
    }

    fn sync(&mut self) {
        self.helper.follow(self.entity, |owner| Transform {
            position: owner.position,
            rotation: owner.rotation,
            scale: Vec3::ONE,
        });
    }
}

impl Component for Light {
    fn update(&mut self, _frame: &FrameContext) -> Result<(), ComponentError> {
        self.sync();
        Ok(())
    }

    fn destroy(&mut self) {
        self.helper.destroy();
    }

    fn serialize(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&self.data).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light")
            .field("entity", &self.entity)
            .field("data", &self.data)
            .field("helper", &self.helper.id())
            .finish()
    }
}

pub fn light_factory(
    scene: Rc<dyn SceneHost>,
) -> impl Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError> {
    move |entity, data| {
        let data: LightData = if data.is_null() {
            LightData::default()
        } else {
            serde_json::from_value(data.clone())?
        };
        Ok(Box::new(Light::new(entity, data, Rc::clone(&scene))?) as Box<dyn Component>)
    }
}
