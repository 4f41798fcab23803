//! Phase 5: radar scans.
//!
//! Scans only read the world, so they are computed in parallel with rayon
//! and then delivered in the turn order. Every agent has finished moving by
//! now; what a radar sees is the post-move world.

use rayon::prelude::*;

use crate::entity::{AgentBody, AgentId};
use crate::event::AgentEvent;
use crate::geometry::{bearing, normal_relative_angle, ScanArc};
use crate::rules;
use crate::world::WorldState;

use super::{Phase, ResolveContext, Resolver};

/// Sweeps radars and reports what they saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanResolver;

impl ScanResolver {
    /// Creates the resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Resolver for ScanResolver {
    fn phase(&self) -> Phase {
        Phase::Scan
    }

    fn resolve(&self, world: &mut WorldState, ctx: &mut ResolveContext<'_>) {
        let frozen: &WorldState = world;
        let sightings: Vec<(AgentId, Vec<AgentEvent>)> = ctx
            .order
            .par_iter()
            .filter_map(|&id| {
                let scanner = frozen.agent(id)?;
                let ready =
                    scanner.is_alive() && scanner.scan_pending && scanner.capabilities.has_radar();
                ready.then(|| (id, sweep(frozen, scanner)))
            })
            .collect();

        for (id, events) in sightings {
            for event in events {
                ctx.events.send(id, ctx.turn, event);
            }
        }
        for body in world.agents_mut() {
            body.scan_pending = false;
        }
    }
}

/// Agents inside the radar's sweep this turn, nearest first.
fn sweep(world: &WorldState, scanner: &AgentBody) -> Vec<AgentEvent> {
    let arc = ScanArc::swept(
        scanner.position,
        rules::RADAR_SCAN_RADIUS,
        scanner.last_radar_heading,
        scanner.radar_heading,
    );
    let mut seen: Vec<(f64, AgentEvent)> = world
        .agents()
        .filter(|t| t.id != scanner.id && t.is_alive())
        .filter(|t| arc.intersects_box(&t.bounding_box()))
        .map(|t| {
            let distance = scanner.position.distance(t.position);
            let event = AgentEvent::Scanned {
                target: t.id,
                energy: t.energy,
                bearing: normal_relative_angle(
                    bearing(scanner.position, t.position) - scanner.body_heading,
                ),
                distance,
                heading: t.body_heading,
                velocity: t.velocity,
            };
            (distance, event)
        })
        .collect();
    seen.sort_by(|a, b| a.0.total_cmp(&b.0));
    seen.into_iter().map(|(_, event)| event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Capabilities;
    use crate::tests::helpers::TestBed;
    use glam::DVec2;
    use std::f64::consts::FRAC_PI_4;

    fn scanning_bed() -> TestBed {
        let mut bed = TestBed::arena(2000.0, 2000.0);
        bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
        bed.add_agent(2, DVec2::new(300.0, 350.0), 0.0);
        bed.add_agent(3, DVec2::new(40.0, 300.0), 0.0);
        bed.add_agent(4, DVec2::new(600.0, 300.0), 0.0);
        bed.start();
        bed
    }

    fn targets(events: &[AgentEvent]) -> Vec<AgentId> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Scanned { target, .. } => Some(*target),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sweep_sees_only_what_it_covers() {
        let mut bed = scanning_bed();
        {
            let body = bed.agent_mut(1);
            body.last_radar_heading = 0.0;
            body.radar_heading = FRAC_PI_4;
            body.scan_pending = true;
        }

        bed.run(&ScanResolver::new());

        let seen = targets(&bed.events_for(AgentId::new(1)));
        assert_eq!(seen, vec![AgentId::new(2), AgentId::new(4)]);
    }

    #[test]
    fn still_radar_is_a_ray() {
        let mut bed = scanning_bed();
        bed.agent_mut(1).scan_pending = true;

        bed.run(&ScanResolver::new());

        let seen = targets(&bed.events_for(AgentId::new(1)));
        assert_eq!(seen, vec![AgentId::new(4)]);
    }

    #[test]
    fn no_scan_without_flag() {
        let mut bed = scanning_bed();
        bed.agent_mut(1).radar_heading = FRAC_PI_4;

        bed.run(&ScanResolver::new());

        assert!(bed.events_for(AgentId::new(1)).is_empty());
    }

    #[test]
    fn droids_have_no_radar() {
        let mut bed = scanning_bed();
        {
            let body = bed.agent_mut(1);
            body.capabilities = Capabilities::TEAM | Capabilities::DROID;
            body.radar_heading = FRAC_PI_4;
            body.scan_pending = true;
        }

        bed.run(&ScanResolver::new());

        assert!(bed.events_for(AgentId::new(1)).is_empty());
        assert!(!bed.agent(1).scan_pending);
    }

    #[test]
    fn scanned_event_carries_bearing_and_distance() {
        let mut bed = scanning_bed();
        bed.agent_mut(1).scan_pending = true;

        bed.run(&ScanResolver::new());

        match &bed.events_for(AgentId::new(1))[0] {
            AgentEvent::Scanned {
                bearing, distance, ..
            } => {
                assert!(bearing.abs() < 1e-12);
                assert!((distance - 500.0).abs() < 1e-12);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
