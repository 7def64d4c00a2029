//! Progression iterators, defined in Section B.12.
//!
//! A progression iterator yields tuples of (layer, resolution, component,
//! precinct) in the order in which the packets appear in the codestream.
//! Each iterator keeps its loop counters as state so that it can be resumed
//! whenever the packet reader needs the next packet, possibly in a later
//! tile-part.

use crate::codestream::ProgressionOrder;
use crate::tile::TileComponent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacketPosition {
    pub(crate) layer: u32,
    pub(crate) resolution: u8,
    pub(crate) component: usize,
    pub(crate) precinct: u32,
}

/// Precinct information of one resolution level of a tile-component.
#[derive(Debug, Clone, Copy)]
struct ResolutionPrecincts {
    num_wide: u32,
    num_high: u32,
    /// The precinct size, scaled to the full resolution of the component.
    width_in_image: u64,
    height_in_image: u64,
}

impl ResolutionPrecincts {
    fn num_precincts(&self) -> u32 {
        self.num_wide * self.num_high
    }
}

#[derive(Debug, Clone, Copy)]
struct PrecinctGrid {
    min_width: u64,
    min_height: u64,
    max_num_wide: u32,
    max_num_high: u32,
}

impl PrecinctGrid {
    const EMPTY: Self = Self {
        min_width: u64::MAX,
        min_height: u64::MAX,
        max_num_wide: 0,
        max_num_high: 0,
    };

    fn merge(&mut self, other: &Self) {
        self.min_width = self.min_width.min(other.min_width);
        self.min_height = self.min_height.min(other.min_height);
        self.max_num_wide = self.max_num_wide.max(other.max_num_wide);
        self.max_num_high = self.max_num_high.max(other.max_num_high);
    }
}

#[derive(Debug, Clone)]
struct ComponentPrecincts {
    resolutions: Vec<ResolutionPrecincts>,
    grid: PrecinctGrid,
}

impl ComponentPrecincts {
    fn num_decomposition_levels(&self) -> u8 {
        self.resolutions.len().saturating_sub(1) as u8
    }

    fn num_precincts(&self, resolution: u8) -> Option<u32> {
        self.resolutions
            .get(resolution as usize)
            .map(|r| r.num_precincts())
    }

    /// Map a position on the precinct grid of the iteration to the precinct
    /// of the given resolution at that position, if there is one.
    fn precinct_at(&self, px: u32, py: u32, resolution: u8, grid: &PrecinctGrid) -> Option<u32> {
        let size = self.resolutions.get(resolution as usize)?;
        let pos_x = px as u64 * grid.min_width;
        let pos_y = py as u64 * grid.min_height;

        if !pos_x.is_multiple_of(size.width_in_image) || !pos_y.is_multiple_of(size.height_in_image)
        {
            return None;
        }

        let column = pos_x / size.width_in_image;
        let row = pos_y / size.height_in_image;

        if column >= size.num_wide as u64 || row >= size.num_high as u64 {
            return None;
        }

        Some((row * size.num_wide as u64 + column) as u32)
    }
}

#[derive(Debug, Clone)]
struct IterationInfo {
    num_layers: u32,
    components: Vec<ComponentPrecincts>,
    grid: PrecinctGrid,
    max_decomposition_levels: u8,
}

impl IterationInfo {
    fn new(components: &[TileComponent], num_layers: u16) -> Self {
        let mut grid = PrecinctGrid::EMPTY;

        let components = components
            .iter()
            .map(|component| {
                let mut component_grid = PrecinctGrid::EMPTY;
                let levels = component.num_decomposition_levels() as u32;

                let resolutions = component
                    .resolutions
                    .iter()
                    .enumerate()
                    .map(|(r, resolution)| {
                        let scale = 1_u64 << (levels - r as u32);
                        let precincts = ResolutionPrecincts {
                            num_wide: resolution.num_precincts_wide,
                            num_high: resolution.num_precincts_high,
                            width_in_image: scale << resolution.precinct_width_exp,
                            height_in_image: scale << resolution.precinct_height_exp,
                        };

                        component_grid.merge(&PrecinctGrid {
                            min_width: precincts.width_in_image,
                            min_height: precincts.height_in_image,
                            max_num_wide: precincts.num_wide,
                            max_num_high: precincts.num_high,
                        });

                        precincts
                    })
                    .collect();

                grid.merge(&component_grid);

                ComponentPrecincts {
                    resolutions,
                    grid: component_grid,
                }
            })
            .collect::<Vec<_>>();

        let max_decomposition_levels = components
            .iter()
            .map(|c| c.num_decomposition_levels())
            .max()
            .unwrap_or(0);

        Self {
            num_layers: num_layers as u32,
            components,
            grid,
            max_decomposition_levels,
        }
    }
}

/// A resumable iterator over the packets of a tile.
#[derive(Debug, Clone)]
pub(crate) struct PacketIterator {
    info: IterationInfo,
    state: Progression,
}

#[derive(Debug, Clone)]
enum Progression {
    Lrcp(LayerResolutionComponentPosition),
    Rlcp(ResolutionLayerComponentPosition),
    Rpcl(ResolutionPositionComponentLayer),
    Pcrl(PositionComponentResolutionLayer),
    Cprl(ComponentPositionResolutionLayer),
}

impl PacketIterator {
    pub(crate) fn new(
        order: ProgressionOrder,
        components: &[TileComponent],
        num_layers: u16,
    ) -> Self {
        let info = IterationInfo::new(components, num_layers);

        let state = match order {
            ProgressionOrder::LayerResolutionComponentPosition => {
                Progression::Lrcp(LayerResolutionComponentPosition::default())
            }
            ProgressionOrder::ResolutionLayerComponentPosition => {
                Progression::Rlcp(ResolutionLayerComponentPosition::default())
            }
            ProgressionOrder::ResolutionPositionComponentLayer => {
                Progression::Rpcl(ResolutionPositionComponentLayer::new(&info))
            }
            ProgressionOrder::PositionComponentResolutionLayer => {
                Progression::Pcrl(PositionComponentResolutionLayer::default())
            }
            ProgressionOrder::ComponentPositionResolutionLayer => {
                Progression::Cprl(ComponentPositionResolutionLayer::default())
            }
        };

        Self { info, state }
    }

    /// Return the position of the next packet, or `None` once all packets
    /// of the tile have been visited.
    pub(crate) fn next_position(&mut self) -> Option<PacketPosition> {
        let info = &self.info;

        match &mut self.state {
            Progression::Lrcp(s) => s.next(info),
            Progression::Rlcp(s) => s.next(info),
            Progression::Rpcl(s) => s.next(info),
            Progression::Pcrl(s) => s.next(info),
            Progression::Cprl(s) => s.next(info),
        }
    }
}

/// B.12.1.1 Layer-resolution level-component-position progression.
#[derive(Debug, Clone, Default)]
struct LayerResolutionComponentPosition {
    layer: u32,
    resolution: u8,
    component: usize,
    precinct: u32,
}

impl LayerResolutionComponentPosition {
    fn next(&mut self, info: &IterationInfo) -> Option<PacketPosition> {
        while self.layer < info.num_layers {
            while self.resolution <= info.max_decomposition_levels {
                while self.component < info.components.len() {
                    let num_precincts = info.components[self.component]
                        .num_precincts(self.resolution)
                        .unwrap_or(0);

                    if self.precinct < num_precincts {
                        let position = PacketPosition {
                            layer: self.layer,
                            resolution: self.resolution,
                            component: self.component,
                            precinct: self.precinct,
                        };
                        self.precinct += 1;

                        return Some(position);
                    }

                    self.precinct = 0;
                    self.component += 1;
                }

                self.component = 0;
                self.resolution += 1;
            }

            self.resolution = 0;
            self.layer += 1;
        }

        None
    }
}

/// B.12.1.2 Resolution level-layer-component-position progression.
#[derive(Debug, Clone, Default)]
struct ResolutionLayerComponentPosition {
    resolution: u8,
    layer: u32,
    component: usize,
    precinct: u32,
}

impl ResolutionLayerComponentPosition {
    fn next(&mut self, info: &IterationInfo) -> Option<PacketPosition> {
        while self.resolution <= info.max_decomposition_levels {
            while self.layer < info.num_layers {
                while self.component < info.components.len() {
                    let num_precincts = info.components[self.component]
                        .num_precincts(self.resolution)
                        .unwrap_or(0);

                    if self.precinct < num_precincts {
                        let position = PacketPosition {
                            layer: self.layer,
                            resolution: self.resolution,
                            component: self.component,
                            precinct: self.precinct,
                        };
                        self.precinct += 1;

                        return Some(position);
                    }

                    self.precinct = 0;
                    self.component += 1;
                }

                self.component = 0;
                self.layer += 1;
            }

            self.layer = 0;
            self.resolution += 1;
        }

        None
    }
}

/// B.12.1.3 Resolution level-position-component-layer progression.
#[derive(Debug, Clone)]
struct ResolutionPositionComponentLayer {
    resolution: u8,
    precinct: u32,
    component: usize,
    layer: u32,
    /// The largest number of precincts of any component, per resolution.
    max_num_precincts: Vec<u32>,
}

impl ResolutionPositionComponentLayer {
    fn new(info: &IterationInfo) -> Self {
        let max_num_precincts = (0..=info.max_decomposition_levels)
            .map(|r| {
                info.components
                    .iter()
                    .filter_map(|c| c.num_precincts(r))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        Self {
            resolution: 0,
            precinct: 0,
            component: 0,
            layer: 0,
            max_num_precincts,
        }
    }

    fn next(&mut self, info: &IterationInfo) -> Option<PacketPosition> {
        while self.resolution <= info.max_decomposition_levels {
            let max_num_precincts = self.max_num_precincts[self.resolution as usize];

            while self.precinct < max_num_precincts {
                while self.component < info.components.len() {
                    let num_precincts = info.components[self.component]
                        .num_precincts(self.resolution)
                        .unwrap_or(0);

                    if self.precinct < num_precincts && self.layer < info.num_layers {
                        let position = PacketPosition {
                            layer: self.layer,
                            resolution: self.resolution,
                            component: self.component,
                            precinct: self.precinct,
                        };
                        self.layer += 1;

                        return Some(position);
                    }

                    self.layer = 0;
                    self.component += 1;
                }

                self.component = 0;
                self.precinct += 1;
            }

            self.precinct = 0;
            self.resolution += 1;
        }

        None
    }
}

/// B.12.1.4 Position-component-resolution level-layer progression.
#[derive(Debug, Clone, Default)]
struct PositionComponentResolutionLayer {
    py: u32,
    px: u32,
    component: usize,
    resolution: u8,
    layer: u32,
}

impl PositionComponentResolutionLayer {
    fn next(&mut self, info: &IterationInfo) -> Option<PacketPosition> {
        let grid = &info.grid;

        while self.py < grid.max_num_high {
            while self.px < grid.max_num_wide {
                while self.component < info.components.len() {
                    let component = &info.components[self.component];

                    while self.resolution <= component.num_decomposition_levels() {
                        let precinct =
                            component.precinct_at(self.px, self.py, self.resolution, grid);

                        if let Some(precinct) = precinct
                            && self.layer < info.num_layers
                        {
                            let position = PacketPosition {
                                layer: self.layer,
                                resolution: self.resolution,
                                component: self.component,
                                precinct,
                            };
                            self.layer += 1;

                            return Some(position);
                        }

                        self.layer = 0;
                        self.resolution += 1;
                    }

                    self.resolution = 0;
                    self.component += 1;
                }

                self.component = 0;
                self.px += 1;
            }

            self.px = 0;
            self.py += 1;
        }

        None
    }
}

/// B.12.1.5 Component-position-resolution level-layer progression.
#[derive(Debug, Clone, Default)]
struct ComponentPositionResolutionLayer {
    component: usize,
    py: u32,
    px: u32,
    resolution: u8,
    layer: u32,
}

impl ComponentPositionResolutionLayer {
    fn next(&mut self, info: &IterationInfo) -> Option<PacketPosition> {
        while self.component < info.components.len() {
            let component = &info.components[self.component];
            let grid = &component.grid;

            while self.py < grid.max_num_high {
                while self.px < grid.max_num_wide {
                    while self.resolution <= component.num_decomposition_levels() {
                        let precinct =
                            component.precinct_at(self.px, self.py, self.resolution, grid);

                        if let Some(precinct) = precinct
                            && self.layer < info.num_layers
                        {
                            let position = PacketPosition {
                                layer: self.layer,
                                resolution: self.resolution,
                                component: self.component,
                                precinct,
                            };
                            self.layer += 1;

                            return Some(position);
                        }

                        self.layer = 0;
                        self.resolution += 1;
                    }

                    self.resolution = 0;
                    self.px += 1;
                }

                self.px = 0;
                self.py += 1;
            }

            self.py = 0;
            self.component += 1;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codestream::{
        CodeBlockStyle, CodingStyle, CodingStyleFlags, ComponentSizeInfo, SizeData,
        WaveletTransform,
    };
    use crate::rect::IntRect;
    use crate::tile::{build_resolutions, build_tiles};

    const ORDERS: [ProgressionOrder; 5] = [
        ProgressionOrder::LayerResolutionComponentPosition,
        ProgressionOrder::ResolutionLayerComponentPosition,
        ProgressionOrder::ResolutionPositionComponentLayer,
        ProgressionOrder::PositionComponentResolutionLayer,
        ProgressionOrder::ComponentPositionResolutionLayer,
    ];

    /// A tile with two components with different numbers of decomposition
    /// levels and precinct partitions.
    fn components(levels: [u8; 2]) -> Vec<TileComponent> {
        let siz = SizeData {
            reference_grid_width: 64,
            reference_grid_height: 48,
            image_area_x_offset: 0,
            image_area_y_offset: 0,
            tile_width: 64,
            tile_height: 48,
            tile_x_offset: 0,
            tile_y_offset: 0,
            components: vec![
                ComponentSizeInfo {
                    precision: 8,
                    is_signed: false,
                    horizontal_resolution: 1,
                    vertical_resolution: 1,
                    rect: IntRect::from_ltrb(0, 0, 64, 48),
                };
                2
            ],
        };

        let mut tiles = build_tiles(&siz);
        let mut components = core::mem::take(&mut tiles[0].components);

        for (component, levels) in components.iter_mut().zip(levels) {
            let precincts = vec![(3, 3); levels as usize + 1];
            let coding_style = CodingStyle {
                flags: CodingStyleFlags { raw: 1 },
                progression_order: ProgressionOrder::LayerResolutionComponentPosition,
                num_layers: 2,
                mct: false,
                num_decomposition_levels: levels,
                code_block_width: 2,
                code_block_height: 2,
                code_block_style: CodeBlockStyle::default(),
                transformation: WaveletTransform::Reversible53,
                precinct_exponents: precincts,
            };

            build_resolutions(component, &coding_style);
        }

        components
    }

    fn collect(order: ProgressionOrder, components: &[TileComponent]) -> Vec<PacketPosition> {
        let mut iterator = PacketIterator::new(order, components, 2);
        let positions = core::iter::from_fn(|| iterator.next_position()).collect::<Vec<_>>();

        // Exhausted iterators stay exhausted.
        assert!(iterator.next_position().is_none());

        positions
    }

    fn expected_count(components: &[TileComponent], layers: u32) -> usize {
        components
            .iter()
            .flat_map(|c| c.resolutions.iter())
            .map(|r| (r.num_precincts_wide * r.num_precincts_high) as usize * layers as usize)
            .sum()
    }

    #[test]
    fn all_orders_visit_every_packet_once() {
        let components = components([2, 1]);
        let expected = expected_count(&components, 2);

        let mut reference = collect(ORDERS[0], &components);
        assert_eq!(reference.len(), expected);
        reference.sort_by_key(|p| (p.layer, p.resolution, p.component, p.precinct));
        reference.dedup();
        assert_eq!(reference.len(), expected);

        for order in ORDERS {
            let mut positions = collect(order, &components);
            assert_eq!(positions.len(), expected, "{order:?}");

            positions.sort_by_key(|p| (p.layer, p.resolution, p.component, p.precinct));
            assert_eq!(positions, reference, "{order:?}");
        }
    }

    #[test]
    fn lrcp_order() {
        let components = components([1, 0]);
        let positions = collect(ORDERS[0], &components);

        // Component 1 has no second resolution.
        assert!(
            positions
                .iter()
                .all(|p| p.component == 0 || p.resolution == 0)
        );

        let first = positions[0];
        assert_eq!((first.layer, first.resolution, first.component), (0, 0, 0));
        assert!(positions.windows(2).all(|w| w[0].layer <= w[1].layer));
    }

    #[test]
    fn rpcl_order() {
        let components = components([1, 1]);
        let positions = collect(ORDERS[2], &components);

        assert!(positions.windows(2).all(|w| w[0].resolution <= w[1].resolution));
        // Layers are the innermost loop.
        assert_eq!(positions[0].layer, 0);
        assert_eq!(positions[1].layer, 1);
        assert_eq!(positions[0].precinct, positions[1].precinct);
        assert_eq!(positions[2].component, 1);
    }

    #[test]
    fn cprl_order() {
        let components = components([1, 1]);
        let positions = collect(ORDERS[4], &components);

        assert!(positions.windows(2).all(|w| w[0].component <= w[1].component));
    }

    #[test]
    fn precinct_lookup_uses_matching_axes() {
        // A 2x3 grid of precincts that are wider than high.
        let component = ComponentPrecincts {
            resolutions: vec![ResolutionPrecincts {
                num_wide: 2,
                num_high: 3,
                width_in_image: 16,
                height_in_image: 4,
            }],
            grid: PrecinctGrid {
                min_width: 16,
                min_height: 4,
                max_num_wide: 2,
                max_num_high: 3,
            },
        };

        assert_eq!(component.precinct_at(1, 0, 0, &component.grid), Some(1));
        assert_eq!(component.precinct_at(0, 2, 0, &component.grid), Some(4));
        assert_eq!(component.precinct_at(1, 2, 0, &component.grid), Some(5));
        assert_eq!(component.precinct_at(2, 0, 0, &component.grid), None);
    }
}
