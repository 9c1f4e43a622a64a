//! Weapon and armor definitions, built once into keyed lookup tables

use std::collections::HashMap;

/// Weapon id every player falls back to
pub const UNARMED: &str = "unarmed";

/// Damage type used by armor resistances/weaknesses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageType {
    Slash,
    Pierce,
    Blunt,
}

/// Special ability attached to a weapon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecialKind {
    /// Full-circle attack (axe-type weapons)
    Spin,
    /// Extends reach by `range_bonus`
    Lunge { range_bonus: f32 },
    /// Stuns every victim for `duration_ms`
    Stun { duration_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecialAbility {
    pub kind: SpecialKind,
    pub damage_multiplier: f32,
}

/// Weapon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponConfig {
    pub id: String,
    pub damage: f32,
    pub damage_type: DamageType,
    /// Reach from the attacker's center
    pub range: f32,
    /// Attacks per second; cooldown is `1000 / attack_speed` ms
    pub attack_speed: f32,
    /// Hits everyone inside a wide arc instead of a narrow thrust
    pub multi_target: bool,
    pub special: Option<SpecialAbility>,
}

impl WeaponConfig {
    /// Cooldown between normal attacks in milliseconds
    pub fn attack_cooldown_ms(&self) -> u64 {
        if self.attack_speed <= 0.0 {
            return u64::MAX;
        }
        (1000.0 / self.attack_speed).round() as u64
    }
}

/// Armor configuration. Missing entries mean a 1.0 multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmorConfig {
    pub id: String,
    pub resistances: HashMap<DamageType, f32>,
    pub weaknesses: HashMap<DamageType, f32>,
}

impl ArmorConfig {
    pub fn resistance(&self, damage_type: DamageType) -> f32 {
        self.resistances.get(&damage_type).copied().unwrap_or(1.0)
    }

    pub fn weakness(&self, damage_type: DamageType) -> f32 {
        self.weaknesses.get(&damage_type).copied().unwrap_or(1.0)
    }
}

/// Keyed weapon/armor tables shared by every session
#[derive(Debug, Clone)]
pub struct Catalog {
    weapons: HashMap<String, WeaponConfig>,
    armors: HashMap<String, ArmorConfig>,
    unarmed: WeaponConfig,
}

impl Catalog {
    pub fn new(weapons: Vec<WeaponConfig>, armors: Vec<ArmorConfig>) -> Self {
        let mut weapons: HashMap<String, WeaponConfig> =
            weapons.into_iter().map(|w| (w.id.clone(), w)).collect();
        let unarmed = weapons
            .entry(UNARMED.to_string())
            .or_insert_with(unarmed_config)
            .clone();

        Self {
            weapons,
            armors: armors.into_iter().map(|a| (a.id.clone(), a)).collect(),
            unarmed,
        }
    }

    /// Weapon by id; unknown ids resolve to unarmed
    pub fn weapon(&self, id: &str) -> &WeaponConfig {
        self.weapons.get(id).unwrap_or(&self.unarmed)
    }

    pub fn armor(&self, id: &str) -> Option<&ArmorConfig> {
        self.armors.get(id)
    }

    pub fn has_weapon(&self, id: &str) -> bool {
        self.weapons.contains_key(id)
    }

    /// Weapon ids that can appear as loot (everything except unarmed), sorted
    pub fn loot_weapon_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .weapons
            .keys()
            .map(String::as_str)
            .filter(|id| *id != UNARMED)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Armor ids that can appear as loot, sorted
    pub fn loot_armor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.armors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(default_weapons(), default_armors())
    }
}

fn unarmed_config() -> WeaponConfig {
    WeaponConfig {
        id: UNARMED.to_string(),
        damage: 5.0,
        damage_type: DamageType::Blunt,
        range: 40.0,
        attack_speed: 2.0,
        multi_target: false,
        special: None,
    }
}

fn default_weapons() -> Vec<WeaponConfig> {
    vec![
        unarmed_config(),
        WeaponConfig {
            id: "sword".to_string(),
            damage: 20.0,
            damage_type: DamageType::Slash,
            range: 70.0,
            attack_speed: 1.5,
            multi_target: true,
            special: Some(SpecialAbility {
                kind: SpecialKind::Lunge { range_bonus: 60.0 },
                damage_multiplier: 1.5,
            }),
        },
        WeaponConfig {
            id: "axe".to_string(),
            damage: 25.0,
            damage_type: DamageType::Slash,
            range: 65.0,
            attack_speed: 1.0,
            multi_target: true,
            special: Some(SpecialAbility {
                kind: SpecialKind::Spin,
                damage_multiplier: 1.5,
            }),
        },
        WeaponConfig {
            id: "spear".to_string(),
            damage: 15.0,
            damage_type: DamageType::Pierce,
            range: 100.0,
            attack_speed: 1.2,
            multi_target: false,
            special: Some(SpecialAbility {
                kind: SpecialKind::Lunge { range_bonus: 60.0 },
                damage_multiplier: 2.0,
            }),
        },
        WeaponConfig {
            id: "hammer".to_string(),
            damage: 30.0,
            damage_type: DamageType::Blunt,
            range: 60.0,
            attack_speed: 0.8,
            multi_target: false,
            special: Some(SpecialAbility {
                kind: SpecialKind::Stun { duration_ms: 1500 },
                damage_multiplier: 1.2,
            }),
        },
    ]
}

fn default_armors() -> Vec<ArmorConfig> {
    vec![
        ArmorConfig {
            id: "leather".to_string(),
            resistances: HashMap::from([(DamageType::Slash, 0.8), (DamageType::Blunt, 0.9)]),
            weaknesses: HashMap::from([(DamageType::Pierce, 1.5)]),
        },
        ArmorConfig {
            id: "chain".to_string(),
            resistances: HashMap::from([(DamageType::Slash, 0.5), (DamageType::Pierce, 0.9)]),
            weaknesses: HashMap::from([(DamageType::Blunt, 1.5)]),
        },
        ArmorConfig {
            id: "plate".to_string(),
            resistances: HashMap::from([
                (DamageType::Slash, 0.5),
                (DamageType::Pierce, 0.6),
                (DamageType::Blunt, 0.8),
            ]),
            weaknesses: HashMap::new(),
        },
    ]
}
