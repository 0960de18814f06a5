//! Pixel arena and reliability-ordered grouping.
//!
//! Every pixel is a record in one flat arena indexed by row-major position.
//! Groups are intrusive singly-linked lists threaded through the arena:
//! each pixel stores the index of its group's head and of its successor,
//! and the head additionally stores the tail (for O(1) append) and the
//! group size.
//!
//! Merging splices the smaller list onto the larger one and rewrites the
//! head index of every absorbed pixel. A pixel is only relabelled when its
//! group is the smaller side, so each relabel at least doubles the size of
//! the group it ends up in.
//!
//! Each pixel also carries an `increment`: the number of whole periods
//! that bring it into its group's reference frame. Splicing a pixel or a
//! group adds the offset implied by the accepted edge, so after grouping
//! `value + increment * period` is consistent along every accepted edge.

use crate::edge::Edge;
use crate::reliability::sentinel;
use crate::types::{Dimensions, Mask, PhaseMap, UnwrapError, try_with_capacity};

/// State of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Pixel {
    value: f64,
    reliability: f64,
    valid_input: bool,
    valid_extended: bool,
    increment: i32,
    head: usize,
    /// Only meaningful on the head.
    tail: usize,
    next: Option<usize>,
    /// Only meaningful on the head.
    size: usize,
}

/// Counts from one grouping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatherStats {
    /// Edges that joined two distinct groups.
    pub accepted_edges: usize,
    /// Edges skipped because both endpoints were already in one group.
    pub cycle_edges: usize,
    /// Accepted edges where one side was a lone pixel.
    pub singleton_joins: usize,
    /// Accepted edges that merged two multi-pixel groups.
    pub group_merges: usize,
    /// Head rewrites performed by group merges.
    pub relabelled_pixels: usize,
}

/// The per-call pixel arena.
#[derive(Debug, Clone)]
pub struct Pixels {
    dimensions: Dimensions,
    pixels: Vec<Pixel>,
}

impl Pixels {
    /// Build the arena: every pixel starts as its own group with a zero
    /// increment and a sentinel reliability derived from `seed`.
    pub(crate) fn new(
        image: &PhaseMap,
        mask: &Mask,
        extended: &Mask,
        seed: u64,
    ) -> Result<Self, UnwrapError> {
        let dimensions = image.dimensions();
        debug_assert_eq!(mask.dimensions(), dimensions);
        debug_assert_eq!(extended.dimensions(), dimensions);

        let mut pixels = try_with_capacity(dimensions.len())?;
        pixels.extend(image.values().iter().enumerate().map(|(index, &value)| Pixel {
            value,
            reliability: sentinel(seed, index),
            valid_input: mask.is_valid(index),
            valid_extended: extended.is_valid(index),
            increment: 0,
            head: index,
            tail: index,
            next: None,
            size: 1,
        }));
        Ok(Self { dimensions, pixels })
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the arena holds no pixels. Never true for a validated image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The wrapped input sample.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<f64> {
        self.pixels.get(index).map(|p| p.value)
    }

    /// Current reliability (lower is better).
    #[must_use]
    pub fn reliability(&self, index: usize) -> Option<f64> {
        self.pixels.get(index).map(|p| p.reliability)
    }

    /// Whether the input mask marks this pixel valid.
    #[must_use]
    pub fn is_valid_input(&self, index: usize) -> bool {
        self.pixels.get(index).is_some_and(|p| p.valid_input)
    }

    /// Whether the extended mask marks this pixel valid.
    #[must_use]
    pub fn is_valid_extended(&self, index: usize) -> bool {
        self.pixels.get(index).is_some_and(|p| p.valid_extended)
    }

    /// Whole periods to add to this pixel's value.
    #[must_use]
    pub fn increment(&self, index: usize) -> Option<i32> {
        self.pixels.get(index).map(|p| p.increment)
    }

    /// Head of the group containing `index`.
    #[must_use]
    pub fn head_of(&self, index: usize) -> Option<usize> {
        self.pixels.get(index).map(|p| p.head)
    }

    /// Size of the group headed by `head`, or `None` if `head` is not a
    /// group head.
    #[must_use]
    pub fn group_size(&self, head: usize) -> Option<usize> {
        self.pixels
            .get(head)
            .filter(|p| p.head == head)
            .map(|p| p.size)
    }

    /// Whether `index` is a group of one.
    #[must_use]
    pub fn is_alone(&self, index: usize) -> bool {
        self.pixels
            .get(index)
            .is_some_and(|p| p.head == index && p.next.is_none())
    }

    /// Indices of all group heads, ascending.
    pub fn heads(&self) -> impl Iterator<Item = usize> + '_ {
        self.pixels
            .iter()
            .enumerate()
            .filter(|&(index, p)| p.head == index)
            .map(|(index, _)| index)
    }

    /// Members of the group headed by `head`, in list order starting at
    /// the head. Empty if `head` is not a group head.
    pub fn members(&self, head: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.group_size(head).map(|_| head);
        std::iter::successors(start, |&i| self.pixels.get(i).and_then(|p| p.next))
    }

    /// Number of groups (including lone pixels).
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.heads().count()
    }

    pub(crate) fn set_reliability(&mut self, index: usize, reliability: f64) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            pixel.reliability = reliability;
        }
    }

    /// `value + increment * period` for every pixel, in row-major order.
    pub(crate) fn corrected_values(&self, period: f64) -> impl Iterator<Item = f64> + '_ {
        self.pixels
            .iter()
            .map(move |p| f64::from(p.increment).mul_add(period, p.value))
    }

    /// Consume `edges` in order, joining the groups of their endpoints.
    ///
    /// Edges whose endpoints already share a group are skipped; the
    /// result is a spanning forest over the accepted edges.
    pub(crate) fn gather(&mut self, edges: &[Edge]) -> GatherStats {
        let mut stats = GatherStats::default();
        for edge in edges {
            let (a, b) = (edge.a, edge.b);
            let jump = i32::from(edge.required_jump);
            let head_a = self.pixels[a].head;
            let head_b = self.pixels[b].head;
            if head_a == head_b {
                stats.cycle_edges += 1;
                continue;
            }
            stats.accepted_edges += 1;

            let increment_a = self.pixels[a].increment;
            let increment_b = self.pixels[b].increment;
            if self.is_alone(b) {
                self.append(head_a, b);
                self.pixels[b].increment = increment_a - jump;
                stats.singleton_joins += 1;
            } else if self.is_alone(a) {
                self.append(head_b, a);
                self.pixels[a].increment = increment_b + jump;
                stats.singleton_joins += 1;
            } else {
                stats.relabelled_pixels += if self.pixels[head_a].size > self.pixels[head_b].size {
                    self.absorb(head_a, head_b, increment_a - jump - increment_b)
                } else {
                    self.absorb(head_b, head_a, increment_b + jump - increment_a)
                };
                stats.group_merges += 1;
            }
        }
        log::trace!(
            "gather: {} accepted, {} cycle edges, {} merges relabelled {} pixels",
            stats.accepted_edges,
            stats.cycle_edges,
            stats.group_merges,
            stats.relabelled_pixels
        );
        stats
    }

    /// Append the lone pixel `pixel` to the group headed by `head`.
    fn append(&mut self, head: usize, pixel: usize) {
        let tail = self.pixels[head].tail;
        self.pixels[tail].next = Some(pixel);
        self.pixels[head].tail = pixel;
        self.pixels[head].size += 1;
        self.pixels[pixel].head = head;
    }

    /// Splice the group headed by `absorbed` onto the group headed by
    /// `keep`, shifting every absorbed pixel by `offset` periods. Returns
    /// the number of relabelled pixels.
    fn absorb(&mut self, keep: usize, absorbed: usize, offset: i32) -> usize {
        let keep_tail = self.pixels[keep].tail;
        self.pixels[keep_tail].next = Some(absorbed);
        self.pixels[keep].tail = self.pixels[absorbed].tail;
        self.pixels[keep].size += self.pixels[absorbed].size;

        let mut relabelled = 0;
        let mut cursor = Some(absorbed);
        while let Some(index) = cursor {
            let pixel = &mut self.pixels[index];
            pixel.head = keep;
            pixel.increment += offset;
            cursor = pixel.next;
            relabelled += 1;
        }
        relabelled
    }
}
