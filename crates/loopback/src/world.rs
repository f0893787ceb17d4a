use std::f32::consts::TAU;

use glam::Vec2;

use tether::{Bandwidth, InstanceId, Interp, NetValue, ObjectSource, Precision};

pub const SPRITE: &str = "sprite";
pub const AVATAR: &str = "avatar";
pub const STEER: &str = "steer";

const ARENA: Vec2 = Vec2::new(640.0, 480.0);
const AVATAR_SPEED: f32 = 120.0;
const GOLDEN_ANGLE: f32 = 2.399_963;

pub fn sprite_schema() -> Vec<NetValue> {
    vec![
        NetValue::new("x", Precision::Float32, Interp::Linear),
        NetValue::new("y", Precision::Float32, Interp::Linear),
        NetValue::new("angle", Precision::Int16, Interp::Angular),
    ]
}

pub fn avatar_schema() -> Vec<NetValue> {
    vec![
        NetValue::new("x", Precision::Float32, Interp::Linear),
        NetValue::new("y", Precision::Float32, Interp::Linear),
        NetValue::new("heading", Precision::Int16, Interp::Angular).with_client_value_tag(STEER),
    ]
}

pub fn steer_value() -> NetValue {
    NetValue::new(STEER, Precision::Int16, Interp::Angular)
}

/// Replicated types with their bandwidth class.
pub fn object_types() -> [(&'static str, Vec<NetValue>, Bandwidth); 2] {
    [
        (SPRITE, sprite_schema(), Bandwidth::Normal),
        (AVATAR, avatar_schema(), Bandwidth::Normal),
    ]
}

#[derive(Debug, Clone)]
pub struct Sprite {
    pub id: InstanceId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub spin: f32,
}

/// One avatar per connected peer, steered by that peer's input.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub id: InstanceId,
    pub owner: String,
    pub position: Vec2,
    pub heading: f32,
}

#[derive(Debug, Default)]
pub struct SpriteWorld {
    pub sprites: Vec<Sprite>,
    pub avatars: Vec<Avatar>,
    next_id: InstanceId,
}

impl SpriteWorld {
    pub fn new(count: usize) -> Self {
        let mut world = Self {
            next_id: 1,
            ..Self::default()
        };
        for _ in 0..count {
            world.spawn();
        }
        world
    }

    pub fn spawn(&mut self) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;

        let turn = id as f32 * GOLDEN_ANGLE;
        let direction = Vec2::from_angle(turn);
        self.sprites.push(Sprite {
            id,
            position: ARENA * 0.5 + direction * (40.0 + (id % 7) as f32 * 25.0),
            velocity: direction.perp() * (30.0 + (id % 5) as f32 * 15.0),
            angle: turn % TAU,
            spin: if id % 2 == 0 { 1.5 } else { -0.75 },
        });
        id
    }

    /// Replaces the oldest sprite with a fresh one.
    pub fn respawn(&mut self) -> Option<InstanceId> {
        if self.sprites.is_empty() {
            return None;
        }
        let old = self.sprites.remove(0);
        self.spawn();
        Some(old.id)
    }

    pub fn add_avatar(&mut self, owner: &str) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        self.avatars.push(Avatar {
            id,
            owner: owner.to_string(),
            position: ARENA * 0.5,
            heading: 0.0,
        });
        id
    }

    pub fn remove_avatar(&mut self, owner: &str) {
        self.avatars.retain(|a| a.owner != owner);
    }

    pub fn step(&mut self, dt: f32) {
        for sprite in &mut self.sprites {
            sprite.position += sprite.velocity * dt;
            bounce(&mut sprite.position, &mut sprite.velocity);
            sprite.angle = (sprite.angle + sprite.spin * dt).rem_euclid(TAU);
        }
        for avatar in &mut self.avatars {
            avatar.position += Vec2::from_angle(avatar.heading) * AVATAR_SPEED * dt;
            avatar.position = avatar.position.rem_euclid(ARENA);
        }
    }

    pub fn steer(&mut self, owner: &str, heading: f32) {
        if let Some(avatar) = self.avatars.iter_mut().find(|a| a.owner == owner) {
            avatar.heading = heading;
        }
    }

    pub fn instance_count(&self) -> usize {
        self.sprites.len() + self.avatars.len()
    }
}

fn bounce(position: &mut Vec2, velocity: &mut Vec2) {
    if position.x < 0.0 || position.x > ARENA.x {
        velocity.x = -velocity.x;
    }
    if position.y < 0.0 || position.y > ARENA.y {
        velocity.y = -velocity.y;
    }
    *position = position.clamp(Vec2::ZERO, ARENA);
}

impl ObjectSource for SpriteWorld {
    fn count(&self, sid: &str) -> usize {
        match sid {
            SPRITE => self.sprites.len(),
            AVATAR => self.avatars.len(),
            _ => 0,
        }
    }

    fn instance_id(&self, sid: &str, index: usize) -> InstanceId {
        match sid {
            SPRITE => self.sprites.get(index).map_or(0, |s| s.id),
            _ => self.avatars.get(index).map_or(0, |a| a.id),
        }
    }

    fn value(&self, sid: &str, index: usize, field: usize, _schema: &NetValue) -> f64 {
        let (position, angle) = match sid {
            SPRITE => match self.sprites.get(index) {
                Some(s) => (s.position, s.angle),
                None => return 0.0,
            },
            _ => match self.avatars.get(index) {
                Some(a) => (a.position, a.heading),
                None => return 0.0,
            },
        };
        match field {
            0 => position.x as f64,
            1 => position.y as f64,
            _ => angle as f64,
        }
    }
}

/// Peers have nothing to replicate.
pub struct Nothing;

impl ObjectSource for Nothing {
    fn count(&self, _sid: &str) -> usize {
        0
    }

    fn instance_id(&self, _sid: &str, _index: usize) -> InstanceId {
        0
    }

    fn value(&self, _sid: &str, _index: usize, _field: usize, _schema: &NetValue) -> f64 {
        0.0
    }
}
