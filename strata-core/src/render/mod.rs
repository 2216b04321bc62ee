//! # Render
//!
//! Composites the layer tree of a [`State`] onto a caller-owned surface. Groups are rendered into
//! off-screen images which are kept between passes, keyed by the group's id and revision. Since
//! any change within a group gives it a new revision, a stale composite is never reused. Entries
//! not touched during a pass are evicted at its end.

use crate::{
    blend::composite_image,
    raster::DrawContext,
    selection::Selection,
    state::{Group, Layer, LayerNode, NodeId, State},
    util::{DimensionMismatch, Revision, Size},
};

/// An uncommitted pixel edit to preview on top of one layer.
pub struct InFlightEdit<'f> {
    pub target: NodeId,
    pub draw: Box<dyn FnOnce(&mut DrawContext<'_>) + 'f>,
}
impl<'f> InFlightEdit<'f> {
    pub fn new(target: NodeId, draw: impl FnOnce(&mut DrawContext<'_>) + 'f) -> Self {
        Self {
            target,
            draw: Box::new(draw),
        }
    }
}

struct CacheEntry {
    revision: Revision,
    image: image::RgbaImage,
    used: bool,
}

pub struct Renderer {
    cache: hashbrown::HashMap<NodeId, CacheEntry>,
    /// Where in-flight edits are drawn. Sized to the canvas.
    scratch: image::RgbaImage,
    size: Option<Size>,
    caching: bool,
}
impl Default for Renderer {
    fn default() -> Self {
        Self::new(true)
    }
}
impl Renderer {
    #[must_use]
    pub fn new(caching: bool) -> Self {
        Self {
            cache: hashbrown::HashMap::new(),
            scratch: image::RgbaImage::new(0, 0),
            size: None,
            caching,
        }
    }
    #[must_use]
    pub fn from_config(config: &crate::config::DocumentConfig) -> Self {
        Self::new(config.render_cache)
    }
    /// Number of groups with a cached composite.
    #[must_use]
    pub fn cached_groups(&self) -> usize {
        self.cache.len()
    }
    /// Forget every cached composite.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
    /// Composite the whole document onto `surface`, replacing its contents.
    pub fn render(
        &mut self,
        state: &State,
        surface: &mut image::RgbaImage,
        in_flight: Option<InFlightEdit<'_>>,
    ) -> Result<(), DimensionMismatch> {
        let size = state.size();
        size.expect(Size::of_image(surface))?;
        if self.size != Some(size) {
            log::debug!("canvas is now {size}, dropping {} cached groups", self.cache.len());
            self.cache.clear();
            self.scratch = image::RgbaImage::new(size.width, size.height);
            self.size = Some(size);
        }
        for entry in self.cache.values_mut() {
            entry.used = false;
        }

        surface.fill(0);
        let mut pass = Pass {
            selection: state.selection(),
            in_flight,
        };
        self.composite(state.layers(), surface, &mut pass)?;

        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.used);
        let evicted = before - self.cache.len();
        if evicted != 0 {
            log::trace!("evicted {evicted} cached groups");
        }
        Ok(())
    }
    /// Composite `nodes` onto `dest`, bottom-most first.
    fn composite(
        &mut self,
        nodes: &[LayerNode],
        dest: &mut image::RgbaImage,
        pass: &mut Pass<'_, '_>,
    ) -> Result<(), DimensionMismatch> {
        for node in nodes.iter().rev() {
            if !node.props().visible {
                continue;
            }
            match node {
                LayerNode::Layer(layer) => self.composite_layer(layer, dest, pass)?,
                LayerNode::Group(group) => self.composite_group(group, dest, pass)?,
            }
        }
        Ok(())
    }
    fn composite_layer(
        &mut self,
        layer: &Layer,
        dest: &mut image::RgbaImage,
        pass: &mut Pass<'_, '_>,
    ) -> Result<(), DimensionMismatch> {
        let blend = layer.props().blend;
        let Some(edit) = pass.take_edit_for(layer.id()) else {
            return composite_image(dest, layer.buffer().image(), blend);
        };
        let source = layer.buffer().image();
        Size::of_image(&self.scratch).expect(Size::of_image(source))?;
        self.scratch.copy_from_slice(source.as_raw());
        {
            let mut ctx = DrawContext::new(&mut self.scratch).with_selection(pass.selection);
            (edit.draw)(&mut ctx);
        }
        composite_image(dest, &self.scratch, blend)
    }
    fn composite_group(
        &mut self,
        group: &Group,
        dest: &mut image::RgbaImage,
        pass: &mut Pass<'_, '_>,
    ) -> Result<(), DimensionMismatch> {
        let blend = group.props().blend;
        // A preview within the group makes this pass's composite unfit for reuse.
        let previewing = pass
            .in_flight
            .as_ref()
            .is_some_and(|edit| group.children().iter().any(|c| c.contains(&edit.target)));
        let cacheable = self.caching && !previewing;
        if let Some(entry) = self.cache.get_mut(group.id()) {
            // Keep it around either way, the preview is temporary.
            entry.used = true;
            if cacheable && entry.revision == group.revision() {
                return composite_image(dest, &entry.image, blend);
            }
        }
        let mut image = image::RgbaImage::new(dest.width(), dest.height());
        self.composite(group.children(), &mut image, pass)?;
        composite_image(dest, &image, blend)?;
        if cacheable {
            log::trace!("cached group {}", group.id());
            self.cache.insert(
                group.id().clone(),
                CacheEntry {
                    revision: group.revision(),
                    image,
                    used: true,
                },
            );
        }
        Ok(())
    }
}

struct Pass<'s, 'f> {
    selection: Option<&'s Selection>,
    in_flight: Option<InFlightEdit<'f>>,
}
impl<'f> Pass<'_, 'f> {
    fn take_edit_for(&mut self, id: &NodeId) -> Option<InFlightEdit<'f>> {
        if self.in_flight.as_ref()?.target == *id {
            self.in_flight.take()
        } else {
            None
        }
    }
}
