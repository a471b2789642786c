use image::DynamicImage;
use pdfium_render::prelude::*;

use crate::config::{ImageExtractionOptions, ImageFormat};
use crate::error::{CoreError, CoreResult};

pub struct RasterOutput {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Rasterizes one page at the requested dpi/format/bounds (§4.3), the same
/// pdfium render-config pattern as the teacher's `render_page_as_image`.
pub fn rasterize(page: &PdfPage, options: &ImageExtractionOptions) -> CoreResult<RasterOutput> {
    let dpi = options.dpi.clamp(72, 600);
    let scale = dpi as f32 / 72.0;
    let mut target_width = (page.width().value * scale) as i32;
    let mut target_height = (page.height().value * scale) as i32;

    if let Some(max_w) = options.max_width {
        target_width = target_width.min(max_w as i32);
    }
    if let Some(max_h) = options.max_height {
        target_height = target_height.min(max_h as i32);
    }

    let config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_target_height(target_height);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| CoreError::Image(format!("failed to render page: {e}")))?;

    let image: DynamicImage = bitmap.as_image();
    let width = image.width();
    let height = image.height();

    let format = match options.format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Tiff => image::ImageFormat::Tiff,
    };

    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    image
        .write_to(&mut cursor, format)
        .map_err(|e| CoreError::Image(format!("failed to encode image: {e}")))?;

    Ok(RasterOutput {
        bytes,
        width,
        height,
    })
}

/// Reduced-parameter retry options (§4.3): dpi down to at most 96, quality
/// down to at most 80, bounds down to at most 1400px.
pub fn reduced_options(options: &ImageExtractionOptions) -> ImageExtractionOptions {
    ImageExtractionOptions {
        pages: options.pages.clone(),
        dpi: options.dpi.min(96),
        format: options.format,
        quality: options.quality.min(80),
        max_width: Some(options.max_width.unwrap_or(1400).min(1400)),
        max_height: Some(options.max_height.unwrap_or(1400).min(1400)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduced_options_clamp_dpi_quality_and_bounds() {
        let base = ImageExtractionOptions {
            pages: None,
            dpi: 300,
            format: ImageFormat::Png,
            quality: 95,
            max_width: Some(2000),
            max_height: None,
        };
        let reduced = reduced_options(&base);
        assert_eq!(reduced.dpi, 96);
        assert_eq!(reduced.quality, 80);
        assert_eq!(reduced.max_width, Some(1400));
        assert_eq!(reduced.max_height, Some(1400));
    }
}
