//! Physical rules of the arena.
//!
//! All constants are expressed per turn. Angles are radians, measured
//! counter-clockwise from the +x axis.
//!
//! # Example
//!
//! ```
//! use skirmish_core::rules;
//!
//! assert_eq!(rules::bullet_speed(3.0), 11.0);
//! assert_eq!(rules::bullet_damage(3.0), 16.0);
//! ```

use std::f64::consts::PI;

// =============================================================================
// Movement
// =============================================================================

/// Acceleration applied per turn when speeding up.
pub const ACCELERATION: f64 = 1.0;

/// Deceleration applied per turn when braking.
pub const DECELERATION: f64 = 2.0;

/// Absolute velocity cap.
pub const MAX_VELOCITY: f64 = 8.0;

/// Maximum body turn rate, reached when standing still.
pub const MAX_TURN_RATE: f64 = 10.0 * PI / 180.0;

/// Maximum gun turn rate.
pub const GUN_TURN_RATE: f64 = 20.0 * PI / 180.0;

/// Maximum radar turn rate.
pub const RADAR_TURN_RATE: f64 = 45.0 * PI / 180.0;

/// Radius of the radar scan arc.
pub const RADAR_SCAN_RADIUS: f64 = 1200.0;

// =============================================================================
// Bodies
// =============================================================================

/// Side length of an agent's square bounding box.
pub const AGENT_SIZE: f64 = 36.0;

/// Half of [`AGENT_SIZE`], the distance from centre to wall contact.
pub const AGENT_HALF_SIZE: f64 = AGENT_SIZE / 2.0;

/// Energy every agent starts a round with.
pub const INITIAL_ENERGY: f64 = 100.0;

/// Extra starting energy for a team leader.
pub const LEADER_BONUS_ENERGY: f64 = 100.0;

/// Extra starting energy for a droid.
pub const DROID_BONUS_ENERGY: f64 = 20.0;

/// Gun heat at round start; nobody can fire on the first turns.
pub const INITIAL_GUN_HEAT: f64 = 3.0;

/// Energy below which an agent is considered empty.
pub const ENERGY_EPSILON: f64 = 0.01;

/// Damage dealt to every teammate when the team leader dies.
pub const LEADER_DEATH_DAMAGE: f64 = 30.0;

// =============================================================================
// Collisions
// =============================================================================

/// Damage each party takes in an agent-agent collision.
pub const RAM_DAMAGE: f64 = 0.6;

/// Score credited to the at-fault agent for each ram.
pub const RAM_SCORE: f64 = RAM_DAMAGE * 2.0;

/// Minimum bullet power.
pub const MIN_BULLET_POWER: f64 = 0.1;

/// Maximum bullet power.
pub const MAX_BULLET_POWER: f64 = 3.0;

/// Radius of a bullet used for wall contact.
pub const BULLET_RADIUS: f64 = 3.0;

/// Frames a bullet spends exploding after hitting an agent.
pub const EXPLOSION_FRAMES: u32 = 17;

/// Frames spent exploding after any other hit.
pub const SHORT_EXPLOSION_FRAMES: u32 = 1;

// =============================================================================
// Inactivity
// =============================================================================

/// Energy removed per turn once the battle has been idle too long.
pub const INACTIVITY_ZAP: f64 = 0.1;

/// Energy removed per turn during the grace period after an abort.
pub const ABORT_ZAP: f64 = 5.0;

// =============================================================================
// Formulas
// =============================================================================

/// Clamps a requested firing power to the legal range.
#[must_use]
pub fn clamp_power(power: f64) -> f64 {
    power.clamp(MIN_BULLET_POWER, MAX_BULLET_POWER)
}

/// Damage dealt by a bullet of the given power.
#[must_use]
pub fn bullet_damage(power: f64) -> f64 {
    let power = clamp_power(power);
    let mut damage = 4.0 * power;
    if power > 1.0 {
        damage += 2.0 * (power - 1.0);
    }
    damage
}

/// Energy returned to the owner when its bullet hits.
#[must_use]
pub fn bullet_hit_bonus(power: f64) -> f64 {
    3.0 * clamp_power(power)
}

/// Distance a bullet travels per turn.
#[must_use]
pub fn bullet_speed(power: f64) -> f64 {
    20.0 - 3.0 * clamp_power(power)
}

/// Heat added to the gun by firing.
#[must_use]
pub fn gun_heat(power: f64) -> f64 {
    1.0 + clamp_power(power) / 5.0
}

/// Side of the square trigger area of a mine.
#[must_use]
pub fn mine_trigger_size(power: f64) -> f64 {
    2.0 * (10.0 * clamp_power(power)).sqrt()
}

/// Damage from hitting a wall at the given velocity.
#[must_use]
pub fn wall_hit_damage(velocity: f64) -> f64 {
    (velocity.abs() / 2.0 - 1.0).max(0.0)
}

/// Body turn rate at the given velocity.
#[must_use]
pub fn turn_rate(velocity: f64) -> f64 {
    (0.4 + 0.6 * (1.0 - velocity.abs() / MAX_VELOCITY)) * MAX_TURN_RATE
}

// =============================================================================
// Velocity model
// =============================================================================

/// Highest speed from which the agent can still stop within `distance`.
#[must_use]
pub fn max_velocity_for_distance(distance: f64) -> f64 {
    let decel_time = (((4.0 * 2.0 / DECELERATION) * distance + 1.0).sqrt() - 1.0) / 2.0;
    let decel_time = decel_time.ceil().max(1.0);
    if decel_time.is_infinite() {
        return MAX_VELOCITY;
    }
    let decel_dist = (decel_time / 2.0) * (decel_time - 1.0) * DECELERATION;
    ((decel_time - 1.0) * DECELERATION) + ((distance - decel_dist) / decel_time)
}

fn max_deceleration(speed: f64) -> f64 {
    let decel_time = speed / DECELERATION;
    let accel_time = 1.0 - decel_time;
    decel_time.min(1.0) * DECELERATION + accel_time.max(0.0) * ACCELERATION
}

/// Velocity for the next turn given the current velocity and remaining distance.
///
/// # Arguments
///
/// * `velocity` - Current signed velocity
/// * `distance` - Signed distance still to travel
/// * `cap` - User velocity cap, already clamped to [`MAX_VELOCITY`]
#[must_use]
pub fn next_velocity(velocity: f64, distance: f64, cap: f64) -> f64 {
    if distance < 0.0 {
        return -next_velocity(-velocity, -distance, cap);
    }
    let goal = if distance.is_infinite() {
        cap
    } else {
        max_velocity_for_distance(distance).min(cap)
    };
    if velocity >= 0.0 {
        (velocity - DECELERATION).max(goal.min(velocity + ACCELERATION))
    } else {
        (velocity - ACCELERATION).max(goal.min(velocity + max_deceleration(-velocity)))
    }
}

/// Distance covered while braking from `velocity` to a stop.
#[must_use]
pub fn stopping_distance(velocity: f64) -> f64 {
    let mut speed = velocity.abs();
    let mut distance = 0.0;
    while speed > 0.0 {
        speed = next_velocity(speed, 0.0, MAX_VELOCITY);
        distance += speed;
    }
    distance
}
