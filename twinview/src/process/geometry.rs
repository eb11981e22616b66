use crate::compose::Region;
use crate::framework::config::DisplayLayout;
use crate::scene::DisplayChannel;

/// Where a supervised application should place its window, handed over
/// through environment variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisplayGeometry {
    pub channel: DisplayChannel,
    pub region: Region,
    pub left_x: u32,
    pub right_x: u32,
    pub output_size: [u32; 2],
    pub x_display: Option<String>,
}

impl DisplayGeometry {
    pub fn new(
        channel: DisplayChannel,
        layout: &DisplayLayout,
        x_display: Option<String>,
    ) -> Self {
        Self {
            channel,
            region: layout.region(channel),
            left_x: layout.left_x,
            right_x: layout.right_x,
            output_size: layout.output_size(),
            x_display,
        }
    }

    pub fn env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("TWINVIEW_CHANNEL", self.channel.to_string()),
            ("TWINVIEW_X", self.region.x.to_string()),
            ("TWINVIEW_Y", self.region.y.to_string()),
            ("TWINVIEW_WIDTH", self.region.width.to_string()),
            ("TWINVIEW_HEIGHT", self.region.height.to_string()),
            ("TWINVIEW_LEFT_X", self.left_x.to_string()),
            ("TWINVIEW_RIGHT_X", self.right_x.to_string()),
            ("TWINVIEW_OUTPUT_WIDTH", self.output_size[0].to_string()),
            ("TWINVIEW_OUTPUT_HEIGHT", self.output_size[1].to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect::<Vec<_>>();

        if let Some(display) = self.x_display.as_ref() {
            vars.push(("DISPLAY".to_string(), display.clone()));
        }

        vars
    }
}
