//! XML savegames.
//!
//! The document is parsed into a small element tree first and then walked;
//! saving builds the same tree and serializes it with quick-xml.
//!
//! ```xml
//! <Canvas>
//!  <Items PlayerId="1">
//!   <Item Rtti="201" Type="1" Group="0" GroupType="0" Id="4" DataHandlerId="1" x="10" y="10" z="0" ...>
//!    <DataHandler><Property Name="Health" Value="80"/></DataHandler>
//!   </Item>
//!  </Items>
//!  <Effects/>
//!  <EventListener/>
//!  <DataHandler/>
//! </Canvas>
//! ```
//!
//! Loading creates every item first and runs the per-item loaders in a
//! second pass, so references between items (missile targets, effect
//! owners) resolve regardless of their order in the file.

use crate::canvas::Canvas;
use crate::components::*;
use crate::data_handler::DataHandler;
use crate::effects::Effect;
use crate::error::{CanvasError, LoadError, SaveError};
use crate::events::{CanvasEventListener, Condition};
use crate::item_type::{ItemKind, ItemType, ShotType};
use crate::player::PlayerId;
use crate::shots::{Shot, ShotMotion};
use crate::work::Work;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info, warn};

// ============================================================================
// ELEMENT TREE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set(&mut self, name: &str, value: impl Display) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn with(mut self, name: &str, value: impl Display) -> Self {
        self.set(name, value);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// First direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn missing(&self, attribute: &str) -> LoadError {
        LoadError::MissingAttribute {
            element: self.name.clone(),
            attribute: attribute.to_string(),
        }
    }

    fn invalid(&self, attribute: &str, value: &str) -> LoadError {
        LoadError::InvalidAttribute {
            element: self.name.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    /// Required numeric attribute.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, LoadError> {
        let raw = self.attr(name).ok_or_else(|| self.missing(name))?;
        raw.trim().parse().map_err(|_| self.invalid(name, raw))
    }

    /// Optional attribute: `None` when missing, an error when malformed.
    pub fn parse_opt<T: FromStr>(&self, name: &str) -> Result<Option<T>, LoadError> {
        match self.attr(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(name, raw)),
            None => Ok(None),
        }
    }

    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, LoadError> {
        Ok(self.parse_opt(name)?.unwrap_or(default))
    }

    /// Required attribute that may be stored under an older name. The first
    /// name present wins.
    pub fn parse_aliased<T: FromStr>(&self, names: &[&str]) -> Result<T, LoadError> {
        match names.iter().find(|n| self.has_attr(n)) {
            Some(name) => self.parse(name),
            None => Err(self.missing(names.first().copied().unwrap_or_default())),
        }
    }

    pub fn parse_bool(&self, name: &str) -> Result<bool, LoadError> {
        let raw = self.attr(name).ok_or_else(|| self.missing(name))?;
        match raw.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(self.invalid(name, raw)),
        }
    }

    fn parse_vec3(&self, names: [&[&str]; 3]) -> Result<Vec3, LoadError> {
        Ok(Vec3::new(
            self.parse_aliased(names[0])?,
            self.parse_aliased(names[1])?,
            self.parse_aliased(names[2])?,
        ))
    }

    fn set_vec3(&mut self, names: [&str; 3], v: Vec3) {
        self.set(names[0], v.x);
        self.set(names[1], v.y);
        self.set(names[2], v.z);
    }

    /// Parse a document and return its root element.
    pub fn parse_document(xml: &str) -> Result<XmlElement, LoadError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event().map_err(|e| LoadError::Xml(e.to_string()))? {
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let element = element_from(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| LoadError::Xml("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(LoadError::Xml("unclosed element at end of document".into()));
        }
        root.ok_or_else(|| LoadError::Xml("empty document".into()))
    }

    pub fn to_xml(&self) -> Result<String, SaveError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|_| SaveError::Encoding)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), SaveError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }
        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }
}

fn xml_error(err: impl Display) -> SaveError {
    SaveError::Xml(err.to_string())
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, LoadError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| LoadError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| LoadError::Xml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), LoadError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(LoadError::Xml("more than one root element".into())),
    }
    Ok(())
}

fn bool_attr(value: bool) -> u8 {
    u8::from(value)
}

// ============================================================================
// DATA HANDLERS AND LISTENER
// ============================================================================

pub fn save_data_handler(data: &DataHandler) -> XmlElement {
    let mut element = XmlElement::new("DataHandler");
    for (name, value) in data.iter() {
        element.push(
            XmlElement::new("Property")
                .with("Name", name)
                .with("Value", value),
        );
    }
    element
}

pub fn load_data_handler(element: &XmlElement) -> Result<DataHandler, LoadError> {
    let mut data = DataHandler::new();
    for property in element.children_named("Property") {
        let name = property.attr("Name").ok_or_else(|| property.missing("Name"))?;
        let value = property.attr("Value").ok_or_else(|| property.missing("Value"))?;
        data.set_raw(name, value);
    }
    Ok(data)
}

/// Typed value from a loaded data handler; `default` when missing.
fn data_field<T: FromStr>(data: &DataHandler, name: &str, default: T) -> Result<T, LoadError> {
    match data.get_raw(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| LoadError::InvalidAttribute {
            element: "DataHandler".into(),
            attribute: name.into(),
            value: raw.into(),
        }),
    }
}

pub fn save_listener(listener: &CanvasEventListener) -> XmlElement {
    let mut conditions = XmlElement::new("Conditions");
    for condition in listener.conditions() {
        let mut element = XmlElement::new("Condition")
            .with("EventName", &condition.event_name)
            .with("Action", &condition.action)
            .with("Fired", bool_attr(condition.fired));
        if let Some(player) = condition.player_id {
            element.set("PlayerId", player);
        }
        conditions.push(element);
    }
    let mut element = XmlElement::new("EventListener");
    element.push(conditions);
    element
}

pub fn load_listener(
    element: &XmlElement,
    listener: &mut CanvasEventListener,
) -> Result<(), LoadError> {
    let mut conditions = Vec::new();
    if let Some(list) = element.child("Conditions") {
        for c in list.children_named("Condition") {
            let event_name = c.attr("EventName").ok_or_else(|| c.missing("EventName"))?;
            let action = c.attr("Action").ok_or_else(|| c.missing("Action"))?;
            let mut condition = Condition::new(event_name, action);
            condition.player_id = c.parse_opt::<u32>("PlayerId")?.map(PlayerId);
            condition.fired = match c.has_attr("Fired") {
                true => c.parse_bool("Fired")?,
                false => false,
            };
            conditions.push(condition);
        }
    }
    listener.set_conditions(conditions);
    Ok(())
}

// ============================================================================
// CANVAS
// ============================================================================

impl Canvas {
    pub fn save_as_xml(&self) -> Result<String, SaveError> {
        self.save_element().to_xml()
    }

    /// Element tree of the whole canvas.
    pub fn save_element(&self) -> XmlElement {
        let mut per_player: Vec<(PlayerId, XmlElement)> = self
            .players
            .iter()
            .map(|p| (p.id, XmlElement::new("Items").with("PlayerId", p.id)))
            .collect();

        for (id, _) in self.registry.iter() {
            if self.get::<Shot>(id).is_some_and(|s| !s.is_persistent()) {
                continue;
            }
            let Some(owner) = self.owner_of(id) else {
                continue;
            };
            let Some((_, items)) = per_player.iter_mut().find(|(p, _)| *p == owner) else {
                warn!(item = %id, player = %owner, "owner not in player list, item not saved");
                continue;
            };
            if let Some(item) = self.save_item(id) {
                items.push(item);
            }
        }

        let mut root = XmlElement::new("Canvas");
        root.children.extend(per_player.into_iter().map(|(_, e)| e));
        root.push(self.save_effects());
        root.push(save_listener(&self.listener));
        let mut data = self.data.clone();
        data.set("NextItemId", self.registry.last_id().saturating_add(1));
        root.push(save_data_handler(&data));
        root
    }

    fn save_item(&self, id: ItemId) -> Option<XmlElement> {
        let info = *self.get::<ItemTypeInfo>(id)?;
        let pos = self.position(id)?;
        let rotation = self.get::<Rotation>(id).map_or(0.0, |r| r.0);
        let mut item = XmlElement::new("Item")
            .with("Rtti", info.kind.rtti(&info.item_type))
            .with("Type", info.item_type.type_id)
            .with("Group", info.item_type.group)
            .with("GroupType", info.item_type.group_type)
            .with("Id", id.0)
            .with("x", pos.x)
            .with("y", pos.y)
            .with("z", pos.z)
            .with("Rotation", rotation);

        match info.kind {
            ItemKind::Unit => {
                let handler = self.get::<DataHandlerId>(id).map_or(0, |h| h.0);
                item.set("DataHandlerId", handler);
                let velocity = self.get::<Velocity>(id).copied().unwrap_or_default();
                item.set_vec3(["Velocityx", "Velocityy", "Velocityz"], velocity.to_vec3());
                item.push(save_data_handler(&self.unit_data(id, rotation)));
            }
            ItemKind::Shot => {
                let shot = self.get::<Shot>(id)?;
                save_shot(&mut item, shot);
            }
        }
        Some(item)
    }

    fn unit_data(&self, id: ItemId, rotation: f32) -> DataHandler {
        let mut data = DataHandler::new();
        if let Some(stats) = self.get::<UnitStats>(id) {
            data.set("Health", stats.health);
            data.set("Shields", stats.shields);
            data.set("Armor", stats.armor);
        }
        data.set("Work", self.work(id).unwrap_or_default().code());
        data.set("Rotation", rotation);
        if let Some(construction) = self.get::<Construction>(id).filter(|c| !c.is_complete()) {
            data.set("ConstructionStep", construction.step);
        }
        if let Some(timer) = self.destroyed.get(&id) {
            data.set("DeletionTimer", timer);
        }
        data
    }

    fn save_effects(&self) -> XmlElement {
        let mut effects = XmlElement::new("Effects");
        for effect in self.effects.iter().filter(|e| e.is_active()) {
            let mut element = XmlElement::new("Effect")
                .with("PropertiesId", effect.properties_id)
                .with("x", effect.position.x)
                .with("y", effect.position.y)
                .with("z", effect.position.z)
                .with("Rotation", effect.rotation)
                .with("Started", bool_attr(effect.has_started()))
                .with("Delay", effect.delay());
            if let Some(owner) = effect.owner {
                element.set("OwnerId", owner.0);
            }
            effects.push(element);
        }
        effects
    }

    pub fn load_from_xml(&mut self, xml: &str) -> Result<(), LoadError> {
        let root = XmlElement::parse_document(xml)?;
        self.load_element(&root)
    }

    /// Load a canvas element tree. Partial state is left in place when this
    /// fails.
    pub fn load_element(&mut self, root: &XmlElement) -> Result<(), LoadError> {
        if root.name != "Canvas" {
            return Err(LoadError::MissingRoot("Canvas"));
        }
        if self.lock.locked {
            return Err(CanvasError::Locked.into());
        }

        let mut created = Vec::new();
        for items in root.children_named("Items") {
            let player = match items.parse::<u32>("PlayerId") {
                Ok(player) => PlayerId(player),
                Err(err) => {
                    warn!(%err, "skipping Items element");
                    continue;
                }
            };
            if self.players.get(player).is_none() {
                warn!(player = %player, "no such player, skipping its items");
                continue;
            }
            for element in items.children_named("Item") {
                let id = self.create_item_from_xml(element, player)?;
                created.push((id, element));
            }
        }
        for &(id, element) in &created {
            self.load_item(id, element)?;
        }

        if let Some(effects) = root.child("Effects") {
            self.load_effects(effects)?;
        }
        if let Some(listener) = root.child("EventListener") {
            load_listener(listener, &mut self.listener)?;
        }
        if let Some(data) = root.child("DataHandler") {
            self.data = load_data_handler(data)?;
            if let Some(next) = self.data.get::<u32>("NextItemId") {
                self.registry.reserve(ItemId(next.saturating_sub(1)));
            }
        }
        info!(items = created.len(), effects = self.effects.len(), "canvas loaded");
        Ok(())
    }

    fn create_item_from_xml(
        &mut self,
        element: &XmlElement,
        owner: PlayerId,
    ) -> Result<ItemId, LoadError> {
        let rtti: u32 = element.parse("Rtti")?;
        let kind = ItemKind::from_rtti(rtti).ok_or(LoadError::UnknownRtti(rtti))?;

        // Old savegames: UnitType instead of Type, or UnitType as the group
        // of shots that also have a Type.
        let has_type = element.has_attr("Type");
        let type_id: u32 = element.parse_aliased(&["Type", "UnitType"])?;
        let group: u32 = if element.has_attr("Group") {
            element.parse("Group")?
        } else if has_type && element.has_attr("UnitType") {
            element.parse("UnitType")?
        } else {
            0
        };
        let group_type: u32 = if element.has_attr("GroupType") {
            element.parse("GroupType")?
        } else {
            element.parse_or("WeaponType", 0)?
        };

        let x: f32 = element.parse("x")?;
        let y: f32 = element.parse("y")?;
        let z: f32 = element.parse_or("z", 0.0)?;
        let id = ItemId(element.parse("Id")?);

        let item_type = match kind {
            ItemKind::Unit => ItemType::unit(type_id),
            ItemKind::Shot => {
                ShotType::from_code(type_id).ok_or(LoadError::UnknownShotType(type_id))?;
                ItemType {
                    type_id,
                    group,
                    group_type,
                }
            }
        };
        let handler = match kind {
            ItemKind::Unit => Some(element.parse::<u32>("DataHandlerId")?),
            ItemKind::Shot => None,
        };

        let id = self.create_item(kind, owner, item_type, Position::new(x, y, z), id)?;
        if let Some(handler) = handler {
            let mobile = self.unit_properties(id).map_or(true, |p| p.is_mobile);
            if let Some(player) = self.players.get_mut(owner) {
                player.register_unit(id, mobile, handler);
            }
            if let Some(mut handler_id) = self.get_mut::<DataHandlerId>(id) {
                handler_id.0 = handler;
            }
        }
        debug!(item = %id, ?kind, player = %owner, "item created from savegame");
        Ok(id)
    }

    fn load_item(&mut self, id: ItemId, element: &XmlElement) -> Result<(), LoadError> {
        match self.kind_of(id) {
            Some(ItemKind::Unit) => self.load_unit(id, element),
            Some(ItemKind::Shot) => self.load_shot(id, element),
            None => Err(CanvasError::NoSuchItem(id).into()),
        }
    }

    fn load_unit(&mut self, id: ItemId, element: &XmlElement) -> Result<(), LoadError> {
        let props = self.unit_properties(id).ok_or(CanvasError::NotAUnit(id))?;
        let data = element
            .child("DataHandler")
            .ok_or_else(|| element.missing("DataHandler"))
            .and_then(load_data_handler)?;

        let health = data_field(&data, "Health", props.health)?.min(props.health);
        let shields = data_field(&data, "Shields", props.shields)?;
        let armor = data_field(&data, "Armor", props.armor)?;
        let rotation = data_field(&data, "Rotation", element.parse_or("Rotation", 0.0)?)?;
        let step: Option<u32> = match data.contains("ConstructionStep") {
            true => Some(data_field(&data, "ConstructionStep", 0)?),
            false => None,
        };
        let code = data_field(&data, "Work", Work::Idle.code())?;
        let saved_work = Work::from_code(code).ok_or_else(|| LoadError::InvalidAttribute {
            element: "DataHandler".into(),
            attribute: "Work".into(),
            value: code.to_string(),
        })?;
        let velocity = match element.has_attr("Velocityx") {
            true => element.parse_vec3([&["Velocityx"], &["Velocityy"], &["Velocityz"]])?,
            false => Vec3::ZERO,
        };

        if let Some(mut stats) = self.get_mut::<UnitStats>(id) {
            stats.health = health;
            stats.shields = shields;
            stats.armor = armor;
        }
        let construction = match step {
            Some(step) => Construction {
                step: step.min(props.construction_steps),
                steps: props.construction_steps,
            },
            None => Construction::completed(),
        };
        if let Some(mut c) = self.get_mut::<Construction>(id) {
            *c = construction;
        }
        self.set_rotation(id, rotation);

        // Orders are not saved, so a unit can only resume works that need
        // none.
        let work = if health == 0 {
            Work::Destroyed
        } else if !construction.is_complete() {
            Work::Constructed
        } else if saved_work == Work::None {
            Work::None
        } else {
            Work::Idle
        };
        self.set_work(id, work);

        if health == 0 {
            let timer = data_field(&data, "DeletionTimer", 0u32)?;
            self.destroyed.insert(id, timer);
            if let Some(owner) = self.owner_of(id) {
                if let Some(player) = self.players.get_mut(owner) {
                    player.unit_destroyed(id, props.is_mobile);
                }
            }
            if props.remove_wreckage_immediately {
                self.set_visible(id, false);
            }
        } else {
            self.set_velocity(id, velocity);
        }
        self.refresh_grid(id);
        Ok(())
    }

    fn load_shot(&mut self, id: ItemId, element: &XmlElement) -> Result<(), LoadError> {
        let Some(mut shot) = self.get::<Shot>(id).cloned() else {
            return Err(CanvasError::NoSuchItem(id).into());
        };
        let center = self.center(id).ok_or(CanvasError::NoSuchItem(id))?;
        let owner = self.owner_of(id);
        let direction_names: [&[&str]; 3] = [
            &["xVelocity", "xVelo"],
            &["yVelocity", "yVelo"],
            &["zVelocity", "zVelo"],
        ];

        match &mut shot.motion {
            ShotMotion::Bullet { .. } => {}
            ShotMotion::Rocket(rocket) => {
                rocket.direction = element.parse_vec3(direction_names)?;
                rocket.target =
                    element.parse_vec3([&["Targetx"], &["Targety"], &["Targetz"]])?;
                rocket.thrust.speed = element.parse("Speed")?;
                rocket.total_distance = element.parse("TotalDist")?;
                rocket.passed_distance = element.parse("PassedDist")?;
                rocket.z_offset = element.parse("Z")?;
                rocket.max_height = element.parse("MaxHeight")?;
                rocket.last_distance_sq = (rocket.target - center).length_squared();
            }
            ShotMotion::Missile(missile) => {
                missile.direction = element.parse_vec3(direction_names)?;
                missile.thrust.speed = element.parse("Speed")?;
                let target: u32 = element.parse("Target")?;
                missile.target = Some(ItemId(target)).filter(|t| t.is_valid() && self.contains(*t));
                missile.target_position =
                    element.parse_vec3([&["TargetPosX"], &["TargetPosY"], &["TargetPosZ"]])?;
                missile.passed_distance = element.parse("PassedDist")?;
            }
            ShotMotion::Explosion { delay } => {
                *delay = element.parse("Delay")?;
            }
            ShotMotion::Mine { activated } => {
                *activated = element.parse_bool("Activated")?;
            }
            ShotMotion::Bomb(bomb) => {
                bomb.activated = element.parse_bool("Activated")?;
                bomb.thrust.speed = element.parse("Speed")?;
                bomb.horizontal = (
                    element.parse("HorizontalVelocityX")?,
                    element.parse("HorizontalVelocityY")?,
                );
            }
            ShotMotion::Fragment {
                velocity,
                unit_type,
            } => {
                *velocity = element.parse_vec3([
                    &["Velocityx", "Velox"],
                    &["Velocityy", "Veloy"],
                    &["Velocityz", "Veloz"],
                ])?;
                *unit_type = element.parse("UnitProperties")?;
            }
        }

        match shot.motion {
            ShotMotion::Explosion { .. } => {
                shot.damage = element.parse("Damage")?;
                shot.damage_range = element.parse("DamageRange")?;
                shot.full_damage_range = element.parse("FullDamageRange")?;
            }
            ShotMotion::Fragment { unit_type, .. } => {
                let props = owner
                    .and_then(|o| self.species_of(o))
                    .and_then(|s| s.unit_shared(unit_type));
                match props {
                    Some(props) => {
                        shot.damage = props.exploding_fragment_damage;
                        shot.damage_range = props.exploding_fragment_damage_range;
                        shot.full_damage_range = 0.25 * props.exploding_fragment_damage_range;
                    }
                    None => warn!(item = %id, unit_type, "fragment of unknown unit type, no damage"),
                }
            }
            _ => {}
        }

        let rotation = element.parse_or("Rotation", 0.0)?;
        if let Some(mut state) = self.get_mut::<Shot>(id) {
            *state = shot;
        }
        self.set_rotation(id, rotation);
        Ok(())
    }

    fn load_effects(&mut self, element: &XmlElement) -> Result<(), LoadError> {
        for e in element.children_named("Effect") {
            let properties_id: u32 = e.parse("PropertiesId")?;
            let props = self
                .effect_properties
                .get(properties_id)
                .ok_or(LoadError::UnknownEffectProperties(properties_id))?;
            let position = Vec3::new(e.parse("x")?, e.parse("y")?, e.parse_or("z", 0.0)?);
            let owner = e.parse_opt::<u32>("OwnerId")?.map(ItemId);
            let mut effect = Effect::new(props, position, owner);
            effect.rotation = e.parse_or("Rotation", 0.0)?;
            let started = match e.has_attr("Started") {
                true => e.parse_bool("Started")?,
                false => false,
            };
            let delay = e.parse_or("Delay", effect.delay())?;
            effect.restore(true, started, delay);

            if let Some(owner) = owner.filter(|o| !self.contains(*o)) {
                effect.make_obsolete();
                warn!(owner = %owner, properties_id, "effect owner not found, dropping effect");
                return Err(LoadError::UnresolvedEffectOwner(owner));
            }
            self.effects.add(effect);
        }
        Ok(())
    }
}

fn save_shot(item: &mut XmlElement, shot: &Shot) {
    const DIRECTION: [&str; 3] = ["xVelocity", "yVelocity", "zVelocity"];
    match &shot.motion {
        ShotMotion::Bullet { .. } => {}
        ShotMotion::Rocket(rocket) => {
            item.set_vec3(DIRECTION, rocket.direction);
            item.set_vec3(["Targetx", "Targety", "Targetz"], rocket.target);
            item.set("Speed", rocket.thrust.speed);
            item.set("TotalDist", rocket.total_distance);
            item.set("PassedDist", rocket.passed_distance);
            item.set("Z", rocket.z_offset);
            item.set("MaxHeight", rocket.max_height);
        }
        ShotMotion::Missile(missile) => {
            item.set_vec3(DIRECTION, missile.direction);
            item.set("Speed", missile.thrust.speed);
            item.set("Target", missile.target.map_or(0, |t| t.0));
            item.set_vec3(["TargetPosX", "TargetPosY", "TargetPosZ"], missile.target_position);
            item.set("PassedDist", missile.passed_distance);
        }
        ShotMotion::Explosion { delay } => {
            item.set("Damage", shot.damage);
            item.set("DamageRange", shot.damage_range);
            item.set("FullDamageRange", shot.full_damage_range);
            item.set("Delay", delay);
        }
        ShotMotion::Mine { activated } => item.set("Activated", bool_attr(*activated)),
        ShotMotion::Bomb(bomb) => {
            item.set("Activated", bool_attr(bomb.activated));
            item.set("Speed", bomb.thrust.speed);
            item.set("HorizontalVelocityX", bomb.horizontal.0);
            item.set("HorizontalVelocityY", bomb.horizontal.1);
        }
        ShotMotion::Fragment {
            velocity,
            unit_type,
        } => {
            item.set_vec3(["Velocityx", "Velocityy", "Velocityz"], *velocity);
            item.set("UnitProperties", unit_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::tests::*;
    use crate::work::WorkTag;

    fn saved_canvas() -> (Canvas, String) {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        canvas
            .create_unit(BLUE, FACTORY, Position::new(20.5, 20.0, 0.0))
            .unwrap();
        let turret = canvas
            .create_unit(RED, TURRET, Position::new(14.0, 10.0, 0.0))
            .unwrap();
        let wreck = canvas
            .create_unit(RED, TANK, Position::new(30.0, 30.0, 0.0))
            .unwrap();
        canvas.destroy_unit(wreck);
        let rocket = canvas.fire_weapon(turret, 1, Some(tank)).unwrap();
        assert_eq!(canvas.get::<Shot>(rocket).unwrap().shot_type, ShotType::Rocket);
        canvas.unit_damaged(tank, 30);

        let props = canvas.effect_properties().get(1).unwrap().clone();
        canvas
            .effects
            .add(Effect::new(&props, Vec3::new(10.5, 10.5, 0.0), Some(tank)));
        canvas
            .listener
            .add_condition(Condition::new("UnitWithTypeDestroyed", "Alarm"));
        canvas.data.set("Difficulty", 2u32);

        let xml = canvas.save_as_xml().unwrap();
        (canvas, xml)
    }

    #[test]
    fn test_xml_tree_roundtrip() {
        let mut root = XmlElement::new("Canvas").with("Name", "a <b> & \"c\"");
        root.push(XmlElement::new("Items").with("PlayerId", 1));
        let xml = root.to_xml().unwrap();
        assert_eq!(XmlElement::parse_document(&xml).unwrap(), root);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            XmlElement::parse_document("<Canvas><Items></Canvas>"),
            Err(LoadError::Xml(_))
        ));
        assert!(matches!(
            XmlElement::parse_document(""),
            Err(LoadError::Xml(_))
        ));
        let e = XmlElement::new("Item").with("x", "abc");
        assert!(matches!(e.parse::<f32>("x"), Err(LoadError::InvalidAttribute { .. })));
        assert!(matches!(e.parse::<f32>("y"), Err(LoadError::MissingAttribute { .. })));
        assert_eq!(e.parse_or::<f32>("y", 1.5).unwrap(), 1.5);
    }

    #[test]
    fn test_canvas_roundtrip() {
        let (before, xml) = saved_canvas();
        let mut loaded = test_canvas();
        loaded.load_from_xml(&xml).unwrap();

        let saved_ids: Vec<ItemId> = before
            .item_ids()
            .into_iter()
            .filter(|id| before.get::<Shot>(*id).map_or(true, Shot::is_persistent))
            .collect();
        assert_eq!(loaded.item_ids(), saved_ids);
        for id in saved_ids {
            assert_eq!(loaded.position(id), before.position(id), "item {id}");
            assert_eq!(loaded.owner_of(id), before.owner_of(id), "item {id}");
            assert_eq!(loaded.kind_of(id), before.kind_of(id), "item {id}");
            assert_eq!(
                loaded.get::<UnitStats>(id).map(|s| s.health),
                before.get::<UnitStats>(id).map(|s| s.health),
                "item {id}"
            );
            assert_eq!(loaded.work(id), before.work(id), "item {id}");
            let (Some(mut a), Some(b)) = (
                loaded.get::<Shot>(id).cloned(),
                before.get::<Shot>(id).cloned(),
            ) else {
                continue;
            };
            // Recomputed from the loaded center, so only close.
            if let (ShotMotion::Rocket(ra), ShotMotion::Rocket(rb)) = (&mut a.motion, &b.motion) {
                assert!((ra.last_distance_sq - rb.last_distance_sq).abs() < 1e-3);
                ra.last_distance_sq = rb.last_distance_sq;
            }
            assert_eq!(a, b, "item {id}");
        }
        assert_eq!(
            loaded.destroyed_units().collect::<Vec<_>>(),
            before.destroyed_units().collect::<Vec<_>>()
        );
        for player in [BLUE, RED] {
            let (a, b) = (
                loaded.players().get(player).unwrap(),
                before.players().get(player).unwrap(),
            );
            assert_eq!(a.units(), b.units());
            assert_eq!(a.mobiles_count(), b.mobiles_count());
            assert_eq!(a.facilities_count(), b.facilities_count());
        }

        assert_eq!(loaded.effects().len(), before.effects().len());
        assert_eq!(loaded.listener().conditions(), before.listener().conditions());
        assert_eq!(loaded.data_handler().get::<u32>("Difficulty"), Some(2));

        // Fresh ids continue after the loaded ones.
        let last = before.item_ids().into_iter().max().unwrap();
        let tank = loaded
            .create_unit(BLUE, TANK, Position::new(40.0, 40.0, 0.0))
            .unwrap();
        assert!(tank > last);
        assert_eq!(
            loaded.work_buckets().tag_of(tank),
            Some(WorkTag::Work(Work::Idle))
        );
    }

    #[test]
    fn test_legacy_attribute_names() {
        let xml = r#"
            <Canvas>
             <Items PlayerId="1">
              <Item Rtti="1" Type="5" UnitType="1" WeaponType="0" Id="7" x="4.75" y="4.75"
                    Velox="0.1" Veloy="0" Veloz="0.05" UnitProperties="1"/>
              <Item Rtti="201" UnitType="1" Id="0" DataHandlerId="3" x="2" y="2">
               <DataHandler><Property Name="Health" Value="40"/></DataHandler>
              </Item>
             </Items>
            </Canvas>"#;
        let mut canvas = test_canvas();
        canvas.load_from_xml(xml).unwrap();

        let fragment = canvas.get::<Shot>(ItemId(7)).unwrap();
        assert_eq!(
            fragment.motion,
            ShotMotion::Fragment {
                velocity: Vec3::new(0.1, 0.0, 0.05),
                unit_type: 1
            }
        );
        assert_eq!(fragment.damage, 5);
        let info = canvas.get::<ItemTypeInfo>(ItemId(7)).unwrap();
        assert_eq!((info.item_type.group, info.item_type.group_type), (1, 0));

        // Id 0 gets a fresh id.
        let tank = ItemId(8);
        assert_eq!(canvas.get::<UnitStats>(tank).unwrap().health, 40);
        assert_eq!(canvas.position(tank).unwrap().z, 0.0);
    }

    #[test]
    fn test_unknown_player_items_skipped() {
        let xml = r#"<Canvas>
            <Items PlayerId="9"><Item Rtti="201" Type="1" Id="3" DataHandlerId="1" x="1" y="1"/></Items>
            <Items PlayerId="2"/>
        </Canvas>"#;
        let mut canvas = test_canvas();
        canvas.load_from_xml(xml).unwrap();
        assert_eq!(canvas.item_count(), 0);
    }

    #[test]
    fn test_load_failures() {
        let mut canvas = test_canvas();
        let missing_id = r#"<Canvas><Items PlayerId="1">
            <Item Rtti="201" Type="1" DataHandlerId="1" x="1" y="1"/>
        </Items></Canvas>"#;
        assert!(matches!(
            canvas.load_from_xml(missing_id),
            Err(LoadError::MissingAttribute { attribute, .. }) if attribute == "Id"
        ));

        let bad_rtti = r#"<Canvas><Items PlayerId="1">
            <Item Rtti="50" Type="1" Id="1" x="1" y="1"/>
        </Items></Canvas>"#;
        assert!(matches!(
            canvas.load_from_xml(bad_rtti),
            Err(LoadError::UnknownRtti(50))
        ));

        let unknown_effect = r#"<Canvas><Effects><Effect PropertiesId="42" x="1" y="1"/></Effects></Canvas>"#;
        assert!(matches!(
            canvas.load_from_xml(unknown_effect),
            Err(LoadError::UnknownEffectProperties(42))
        ));

        let orphan = r#"<Canvas><Effects><Effect PropertiesId="1" x="1" y="1" OwnerId="77"/></Effects></Canvas>"#;
        assert!(matches!(
            canvas.load_from_xml(orphan),
            Err(LoadError::UnresolvedEffectOwner(ItemId(77)))
        ));
        assert!(canvas.effects().is_empty());

        assert!(matches!(
            canvas.load_from_xml("<Game/>"),
            Err(LoadError::MissingRoot("Canvas"))
        ));
    }
}
