pub mod composite;
pub mod image;
pub mod io;
pub mod normalize;
pub mod outline;
pub mod overlay;

pub use composite::{
    add_layer, apply_saturation, blend_cell_layers, blend_layers, paint_cells, Bcg, CellLayer,
    ChannelLayer, CompositeRaster, SaturationPolicy,
};
pub use image::{blank_canvas, place_tile, raster_to_rgb_image, rescale_image};
pub use io::{load_images, load_masks, save_plot, save_plots, OutputFormat};
pub use normalize::{normalize, NormalizeOptions};
pub use outline::{boundary_mask, outline_cells, outline_owners};
pub use overlay::{annotation_svg, draw_annotations, overlay_svg, Annotations};
