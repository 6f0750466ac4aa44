use std::collections::HashMap;

use foundation::math::ScreenProjection;
use foundation::viewport::Viewport;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, MapEntity};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Size of the rendering surface.
    pub viewport_px: [f32; 2],
    /// Markers closer than this on screen are merged.
    pub radius_px: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            viewport_px: [390.0, 844.0],
            radius_px: 44.0,
        }
    }
}

/// A group of entities that would overlap on screen.
///
/// `members` is never empty and starts with `representative`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub representative: MapEntity,
    pub members: Vec<MapEntity>,
    pub screen_pos_px: [f64; 2],
    /// Largest screen distance from the representative to any member.
    pub expansion_radius_px: f64,
}

impl Cluster {
    pub fn singleton(entity: MapEntity, screen_pos_px: [f64; 2]) -> Self {
        Self {
            representative: entity.clone(),
            members: vec![entity],
            screen_pos_px,
            expansion_radius_px: 0.0,
        }
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn member_ids(&self) -> Vec<EntityId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

/// One render-ready marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Marker {
    Single {
        entity: MapEntity,
        screen_pos_px: [f64; 2],
    },
    Cluster(Cluster),
}

impl Marker {
    /// Every marker viewed as a cluster; singles become size-1 clusters.
    pub fn into_cluster(self) -> Cluster {
        match self {
            Marker::Single {
                entity,
                screen_pos_px,
            } => Cluster::singleton(entity, screen_pos_px),
            Marker::Cluster(c) => c,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Marker::Single { .. } => 1,
            Marker::Cluster(c) => c.count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderPass {
    /// `None` when the viewport has no usable projection.
    pub zoom: Option<f64>,
    pub markers: Vec<Marker>,
}

impl RenderPass {
    pub fn entity_count(&self) -> usize {
        self.markers.iter().map(Marker::count).sum()
    }
}

/// Screen-space clustering of map entities.
///
/// Ordering contract:
/// - Entities are visited in ascending `EntityId` order (input index breaks
///   ties), so the result does not depend on the order entities arrived in.
/// - The first unassigned entity in that order seeds a cluster and becomes its
///   representative; every unassigned entity within `radius_px` of the seed
///   joins it.
/// - Markers are emitted in seed order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn set_viewport_px(&mut self, viewport_px: [f32; 2]) {
        self.config.viewport_px = viewport_px;
    }

    pub fn cluster(&self, viewport: &Viewport, entities: &[MapEntity]) -> RenderPass {
        let mut order: Vec<usize> = (0..entities.len()).collect();
        order.sort_by(|&a, &b| entities[a].id.cmp(&entities[b].id).then(a.cmp(&b)));

        let projection = ScreenProjection::for_viewport(viewport, self.config.viewport_px);
        let radius = self.config.radius_px as f64;

        let Some(projection) = projection.filter(|_| radius > 0.0 && radius.is_finite()) else {
            let markers = order
                .into_iter()
                .map(|i| Marker::Single {
                    entity: entities[i].clone(),
                    screen_pos_px: [0.0, 0.0],
                })
                .collect();
            return RenderPass {
                zoom: projection.map(|p| p.zoom()),
                markers,
            };
        };

        let mut rank = vec![0usize; entities.len()];
        for (k, &i) in order.iter().enumerate() {
            rank[i] = k;
        }

        let screen: Vec<[f64; 2]> = entities
            .iter()
            .map(|e| projection.project(e.coordinate))
            .collect();

        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for &i in &order {
            grid.entry(cell_of(screen[i], radius)).or_default().push(i);
        }

        let mut assigned = vec![false; entities.len()];
        let mut markers = Vec::new();

        for &seed in &order {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;

            let (cx, cy) = cell_of(screen[seed], radius);
            let mut members = vec![seed];
            let mut expansion = 0.0_f64;
            for gy in cy - 1..=cy + 1 {
                for gx in cx - 1..=cx + 1 {
                    let Some(bucket) = grid.get(&(gx, gy)) else {
                        continue;
                    };
                    for &j in bucket {
                        if assigned[j] {
                            continue;
                        }
                        let d = screen_distance(screen[seed], screen[j]);
                        if d <= radius {
                            assigned[j] = true;
                            members.push(j);
                            expansion = expansion.max(d);
                        }
                    }
                }
            }

            if members.len() == 1 {
                markers.push(Marker::Single {
                    entity: entities[seed].clone(),
                    screen_pos_px: screen[seed],
                });
                continue;
            }

            // Seed first, the rest in visiting order.
            members[1..].sort_by_key(|&j| rank[j]);
            markers.push(Marker::Cluster(Cluster {
                representative: entities[seed].clone(),
                members: members.iter().map(|&j| entities[j].clone()).collect(),
                screen_pos_px: screen[seed],
                expansion_radius_px: expansion,
            }));
        }

        RenderPass {
            zoom: Some(projection.zoom()),
            markers,
        }
    }
}

fn cell_of(p: [f64; 2], cell_px: f64) -> (i64, i64) {
    ((p[0] / cell_px).floor() as i64, (p[1] / cell_px).floor() as i64)
}

fn screen_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}
