use std::ops::Range;

use reacdiff_core::{Container, Species};
use reacdiff_mesh::MeshHierarchy;

/// The unknowns of one compartment: every species living there, stored
/// species-major over the compartment's vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub compartment: String,
    pub offset: usize,
    pub num_vertices: usize,
    /// Indices of the block's species in the model's species order.
    pub species: Vec<usize>,
}

impl Block {
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_vertices * self.species.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Maps `(species, vertex)` pairs to positions in the global state vector.
///
/// Compartments without species get no block.
#[derive(Debug, Clone, PartialEq)]
pub struct DofLayout {
    blocks: Vec<Block>,
    /// `(block, position within block)` for each species.
    placement: Vec<(usize, usize)>,
    size: usize,
}

impl DofLayout {
    /// Lays out `species`, whose compartments must all exist in `hierarchy`.
    pub(crate) fn new(species: &Container<Species>, hierarchy: &MeshHierarchy) -> Self {
        let mut blocks: Vec<Block> = Vec::new();
        let mut placement = Vec::with_capacity(species.len());
        for (index, s) in species.iter().enumerate() {
            let block = match blocks.iter().position(|b| b.compartment == s.compartment) {
                Some(b) => b,
                None => {
                    let num_vertices = hierarchy
                        .child(&s.compartment)
                        .map_or(0, reacdiff_mesh::ChildMesh::num_vertices);
                    blocks.push(Block {
                        compartment: s.compartment.clone(),
                        offset: 0,
                        num_vertices,
                        species: Vec::new(),
                    });
                    blocks.len() - 1
                }
            };
            placement.push((block, blocks[block].species.len()));
            blocks[block].species.push(index);
        }

        let mut size = 0;
        for block in &mut blocks {
            block.offset = size;
            size += block.len();
        }
        Self {
            blocks,
            placement,
            size,
        }
    }

    /// Total number of unknowns.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Global index of `species` at local vertex `vertex` of its compartment.
    #[must_use]
    pub fn dof(&self, species: usize, vertex: usize) -> usize {
        let (b, position) = self.placement[species];
        let block = &self.blocks[b];
        block.offset + position * block.num_vertices + vertex
    }

    /// The contiguous range of unknowns belonging to `species`.
    #[must_use]
    pub fn species_range(&self, species: usize) -> Range<usize> {
        let start = self.dof(species, 0);
        let (b, _) = self.placement[species];
        start..start + self.blocks[b].num_vertices
    }
}
