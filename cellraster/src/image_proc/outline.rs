//! Cell outlines traced from label masks.
//!
//! A pixel is on the boundary of its cell when its label is non-zero and at
//! least one 4-neighbour carries a different label; pixels outside the image
//! count as background. Thicker outlines grow outwards one layer at a time:
//! each extra layer claims the unclaimed 4-neighbours of the previous layer
//! that lie outside the owning cell. A thicker outline always contains the
//! thinner one, and cell interiors are never claimed.

use ndarray::Array2;

use crate::collection::LabelMask;
use crate::colour::Rgb;
use crate::error::{CellrasterError, Result};
use crate::image_proc::composite::CompositeRaster;
use crate::image_size::PixelShape;

const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

fn neighbour(
    (y, x): (usize, usize),
    (dy, dx): (isize, isize),
    (height, width): (usize, usize),
) -> Option<(usize, usize)> {
    let ny = y.checked_add_signed(dy)?;
    let nx = x.checked_add_signed(dx)?;
    (ny < height && nx < width).then_some((ny, nx))
}

/// Owning cell id of every outline pixel, 0 elsewhere.
///
/// Layer one is the boundary of each cell. Every further layer grows from
/// the previous one onto unclaimed neighbours outside the owning cell; a
/// pixel reached by several cells in the same layer keeps the first owner.
pub fn outline_owners(mask: &LabelMask, thickness: usize) -> Result<Array2<u32>> {
    if thickness == 0 {
        return Err(CellrasterError::Schema(
            "outline thickness must be at least 1".to_string(),
        ));
    }
    let labels = mask.labels();
    let dim = labels.dim();
    let mut owners = Array2::zeros(dim);
    let mut frontier = Vec::new();

    for ((y, x), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let on_edge = NEIGHBOURS.iter().any(|&offset| {
            neighbour((y, x), offset, dim).map_or(true, |n| labels[n] != label)
        });
        if on_edge {
            owners[[y, x]] = label;
            frontier.push((y, x));
        }
    }

    for _ in 1..thickness {
        let mut next = Vec::new();
        for &pixel in &frontier {
            let owner = owners[pixel];
            for &offset in &NEIGHBOURS {
                if let Some(n) = neighbour(pixel, offset, dim) {
                    if owners[n] == 0 && labels[n] != owner {
                        owners[n] = owner;
                        next.push(n);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(owners)
}

/// Outline pixels of every cell, `thickness` pixels wide.
pub fn boundary_mask(mask: &LabelMask, thickness: usize) -> Result<Array2<bool>> {
    Ok(outline_owners(mask, thickness)?.mapv(|owner| owner != 0))
}

/// Burn outlines into `raster`.
///
/// Every outline pixel takes the colour `colour_for` returns for the cell
/// that owns it; cells without a colour are left as they are. Interior
/// pixels are never written.
pub fn outline_cells<F>(
    raster: &mut CompositeRaster,
    mask: &LabelMask,
    thickness: usize,
    colour_for: F,
) -> Result<()>
where
    F: Fn(u32) -> Option<Rgb>,
{
    let (height, width, _) = raster.dim();
    if mask.labels().dim() != (height, width) {
        return Err(CellrasterError::Schema(format!(
            "mask is {} but the composite is {}",
            mask.shape(),
            PixelShape::new(width, height)
        )));
    }
    let owners = outline_owners(mask, thickness)?;
    for ((y, x), &owner) in owners.indexed_iter().filter(|(_, &owner)| owner != 0) {
        if let Some(colour) = colour_for(owner) {
            raster[[y, x, 0]] = colour.r;
            raster[[y, x, 1]] = colour.g;
            raster[[y, x, 2]] = colour.b;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    /// Label 1 in columns 2..6, label 2 in columns 6..10, rows 2..8.
    fn two_rectangles() -> LabelMask {
        let mut labels = Array2::zeros((10, 12));
        labels.slice_mut(s![2..8, 2..6]).fill(1);
        labels.slice_mut(s![2..8, 6..10]).fill(2);
        LabelMask::new(labels)
    }

    fn expected_boundary(mask: &LabelMask) -> Array2<bool> {
        let labels = mask.labels();
        let (h, w) = labels.dim();
        Array2::from_shape_fn((h, w), |(y, x)| {
            let l = labels[[y, x]];
            l != 0
                && [(0, 1), (2, 1), (1, 0), (1, 2)].iter().any(|&(dy, dx)| {
                    let (ny, nx) = (y + dy, x + dx);
                    ny == 0 || nx == 0 || ny > h || nx > w || labels[[ny - 1, nx - 1]] != l
                })
        })
    }

    #[test]
    fn test_two_rectangles_thickness_one() {
        let mask = two_rectangles();
        let outline = boundary_mask(&mask, 1).unwrap();
        assert_eq!(outline, expected_boundary(&mask));
        // shared edge is outlined on both sides
        assert!(outline[[4, 5]] && outline[[4, 6]]);
        assert!(!outline[[4, 4]]);
    }

    #[test]
    fn test_thickness_grows_outwards() {
        let mask = two_rectangles();
        let thin = boundary_mask(&mask, 1).unwrap();
        let thick = boundary_mask(&mask, 2).unwrap();
        let thin_count = thin.iter().filter(|&&v| v).count();
        let thick_count = thick.iter().filter(|&&v| v).count();
        assert!(thick_count > thin_count);
        for (a, b) in thin.iter().zip(thick.iter()) {
            assert!(!*a || *b);
        }
        // new layer lies outside the cells, interiors stay clear
        assert!(!thin[[4, 1]] && thick[[4, 1]]);
        assert!(!thin[[1, 7]] && thick[[1, 7]]);
        assert!(!thick[[4, 3]] && !thick[[4, 8]]);
        for ((on, was_on), &label) in thick.iter().zip(thin.iter()).zip(mask.labels().iter()) {
            if *on && !*was_on {
                assert_eq!(label, 0);
            }
        }
    }

    #[test]
    fn test_outer_layer_owned_by_source_cell() {
        let owners = outline_owners(&two_rectangles(), 3).unwrap();
        assert_eq!(owners[[4, 1]], 1);
        assert_eq!(owners[[4, 0]], 1);
        assert_eq!(owners[[4, 10]], 2);
        assert_eq!(owners[[4, 11]], 2);
        assert_eq!(owners[[4, 3]], 0);
    }

    #[test]
    fn test_one_pixel_wide_cell() {
        let mut labels = Array2::zeros((5, 5));
        labels.slice_mut(s![1..4, 2..3]).fill(7);
        let mask = LabelMask::new(labels.clone());
        let outline = boundary_mask(&mask, 1).unwrap();
        assert_eq!(outline, labels.mapv(|l| l == 7));
    }

    #[test]
    fn test_zero_thickness_rejected() {
        assert!(matches!(
            boundary_mask(&two_rectangles(), 0),
            Err(CellrasterError::Schema(_))
        ));
    }

    #[test]
    fn test_image_edge_is_boundary() {
        let mask = LabelMask::new(Array2::from_elem((3, 3), 1));
        let outline = boundary_mask(&mask, 1).unwrap();
        assert!(outline[[0, 0]] && outline[[2, 1]]);
        assert!(!outline[[1, 1]]);
    }

    #[test]
    fn test_outline_cells_paints_only_coloured_cells() {
        let mask = two_rectangles();
        let mut raster = Array3::from_elem((10, 12, 3), 0.25);
        outline_cells(&mut raster, &mask, 1, |id| (id == 1).then_some(Rgb::RED)).unwrap();
        assert_eq!(raster[[2, 2, 0]], 1.0);
        assert_eq!(raster[[2, 2, 1]], 0.0);
        // cell 2 boundary untouched, interior untouched
        assert_eq!(raster[[2, 9, 0]], 0.25);
        assert_eq!(raster[[4, 4, 0]], 0.25);
        assert_eq!(raster[[0, 0, 0]], 0.25);
    }

    #[test]
    fn test_outline_cells_paints_outer_layer_in_cell_colour() {
        let mask = two_rectangles();
        let mut raster = Array3::from_elem((10, 12, 3), 0.25);
        outline_cells(&mut raster, &mask, 2, |id| (id == 1).then_some(Rgb::RED)).unwrap();
        assert_eq!(raster[[4, 1, 0]], 1.0);
        assert_eq!(raster[[4, 1, 1]], 0.0);
        // interior of cell 1 and cell 2's outer layer untouched
        assert_eq!(raster[[4, 3, 0]], 0.25);
        assert_eq!(raster[[4, 10, 0]], 0.25);
    }

    #[test]
    fn test_outline_shape_mismatch() {
        let mut raster = Array3::zeros((4, 4, 3));
        let err = outline_cells(&mut raster, &two_rectangles(), 1, |_| Some(Rgb::WHITE));
        assert!(matches!(err, Err(CellrasterError::Schema(_))));
    }
}
