//! # Dashboard Frame Rendering
//!
//! Lays out the agenda, forecast strip and month view into a two-plane
//! [`Frame`]. Layout is deterministic: the same days, slots and date always
//! produce the same bits.
//!
//! ## Regions (880×528 default)
//! ```text
//! +---------+-----------------------------------+
//! | weekday | Today                             |  agenda column:
//! |   16    |   9:00 - Standup                  |  day labels in red,
//! |  June   |   Holiday                         |  events in black
//! |         | Tomorrow                          |
//! | M T W.. |   ...                             |
//! +---------+-----------------------------------+  <- gutter rule
//! | 12:00 15:00 ...        | Mon  Tue  Wed      |  forecast strip
//! |  (g)   (g)             | (g)  (g)  (g)      |
//! |  14°C  15°C            | 20° 8 ...          |
//! +---------------------------------------------+
//! ```
//! Every region draws through a clip rectangle for its own pixel band, so
//! overlong text is cut at the band edge and regions cannot overlap.
//!
//! ## Truncation
//! The agenda column advances a cursor by a fixed line height. When the next
//! line would cross into the gutter, no further lines are drawn at all:
//! later events and days are dropped, never wrapped or shrunk.

use crate::forecast::{ForecastSlots, GlyphTable};
use crate::frame::Frame;
use crate::Day;
use chrono::{Datelike, NaiveDate};
use embedded_graphics::{
    mono_font::{iso_8859_1, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle, RoundedRectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use std::convert::Infallible;

/// Height of the forecast strip below the gutter rule.
const STRIP_HEIGHT: i32 = 128;

/// Single-letter weekday headers, Monday first.
const WEEKDAY_LETTERS: [&str; 7] = ["M", "T", "W", "T", "F", "S", "S"];

/// Fonts for each text role.
#[derive(Clone, Copy)]
pub struct FontSet {
    /// Agenda lines
    pub main_text: &'static MonoFont<'static>,
    /// Weekday, month, slot times and temperatures
    pub label: &'static MonoFont<'static>,
    /// Mini calendar and daily minimum temperatures
    pub small: &'static MonoFont<'static>,
    /// Day of month, drawn at `big_scale`
    pub big: &'static MonoFont<'static>,
    pub big_scale: u32,
    /// Weather glyphs, drawn at `glyph_scale`
    pub glyph: &'static MonoFont<'static>,
    pub glyph_scale: u32,
}

impl Default for FontSet {
    fn default() -> Self {
        Self {
            main_text: &iso_8859_1::FONT_10X20,
            label: &iso_8859_1::FONT_9X18_BOLD,
            small: &iso_8859_1::FONT_6X10,
            big: &iso_8859_1::FONT_10X20,
            big_scale: 4,
            glyph: &iso_8859_1::FONT_10X20,
            glyph_scale: 2,
        }
    }
}

/// Everything a render needs besides its input data.
///
/// Built by the caller and borrowed for one render; nothing is global.
#[derive(Clone, Default)]
pub struct RenderContext {
    pub fonts: FontSet,
    pub glyphs: GlyphTable,
}

/// Pixel geometry derived from the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
    /// y of the rule between the upper regions and the forecast strip
    pub gutter_y: i32,
    pub panel_width: i32,
    pub agenda_x: i32,
    pub agenda_top: i32,
    pub line_height: i32,
    /// Extra space after each day's events
    pub day_spacing: i32,
    pub slot_first_x: i32,
    pub slot_stride: i32,
    pub calendar_x: i32,
    pub calendar_y: i32,
    pub calendar_col: i32,
    pub calendar_row: i32,
}

impl Layout {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width as i32;
        let height = height as i32;
        let gutter_y = (height - STRIP_HEIGHT).max(0);

        Self {
            width,
            height,
            gutter_y,
            panel_width: 200,
            agenda_x: 230,
            agenda_top: 20,
            line_height: 22,
            day_spacing: 6,
            slot_first_x: 50,
            slot_stride: 80,
            calendar_x: 25,
            calendar_y: gutter_y - 130,
            calendar_col: 25,
            calendar_row: 18,
        }
    }

    /// Left date panel band.
    pub fn panel_area(&self) -> Rectangle {
        band(0, 0, self.panel_width + 1, self.gutter_y - 1)
    }

    /// Agenda column band.
    pub fn agenda_area(&self) -> Rectangle {
        band(self.panel_width + 1, 0, self.width, self.gutter_y - 1)
    }

    /// Three-pixel horizontal rule.
    pub fn gutter_area(&self) -> Rectangle {
        band(0, self.gutter_y - 1, self.width, self.gutter_y + 2)
    }

    /// Forecast strip band.
    pub fn strip_area(&self) -> Rectangle {
        band(0, self.gutter_y + 2, self.width, self.height)
    }
}

/// Rectangle from corner coordinates, empty when inverted.
fn band(x0: i32, y0: i32, x1: i32, y1: i32) -> Rectangle {
    Rectangle::new(
        Point::new(x0, y0),
        Size::new((x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32),
    )
}

/// One text line of the agenda column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgendaLine {
    pub y: i32,
    pub text: String,
    /// Day labels go to the red plane
    pub accent: bool,
}

/// Agenda lines with positions, already truncated to the column budget.
pub fn layout_agenda(days: &[Day], layout: &Layout) -> Vec<AgendaLine> {
    let mut lines = Vec::new();
    let mut y = layout.agenda_top;
    let fits = |y: i32| y + layout.line_height < layout.gutter_y;

    for day in days {
        if !fits(y) {
            return lines;
        }
        lines.push(AgendaLine {
            y,
            text: day.label.clone(),
            accent: true,
        });
        y += layout.line_height;

        for event in &day.events {
            if !fits(y) {
                return lines;
            }
            let text = if event.is_all_day() {
                format!("  {}", event.summary)
            } else {
                format!(
                    "  {} - {}",
                    event.start.as_datetime().format("%-H:%M"),
                    event.summary
                )
            };
            lines.push(AgendaLine {
                y,
                text,
                accent: false,
            });
            y += layout.line_height;
        }

        y += layout.day_spacing;
    }

    lines
}

/// A cell of the month view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarCell {
    pub day: u32,
    pub column: u32,
    pub row: u32,
}

/// Month grid for `date`'s month: Monday-first columns, wrapping every 7.
pub fn month_grid(date: NaiveDate) -> Vec<CalendarCell> {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let days_in_month = next_month
        .map(|next| (next - first).num_days() as u32)
        .unwrap_or(31);

    let mut column = first.weekday().num_days_from_monday();
    let mut row = 0;
    let mut cells = Vec::with_capacity(days_in_month as usize);

    for day in 1..=days_in_month {
        cells.push(CalendarCell { day, column, row });
        column += 1;
        if column == 7 {
            column = 0;
            row += 1;
        }
    }
    cells
}

/// Deterministic layout engine for the dashboard.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    context: RenderContext,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, context: RenderContext) -> Self {
        Self {
            width,
            height,
            context,
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.width, self.height)
    }

    /// Render the full dashboard. `forecast = None` leaves the strip empty.
    pub fn render(&self, days: &[Day], forecast: Option<&ForecastSlots>, today: NaiveDate) -> Frame {
        let layout = self.layout();
        let mut frame = Frame::new(self.width, self.height);

        tracing::debug!(
            "rendering {}x{} frame, {} days, forecast: {}",
            self.width,
            self.height,
            days.len(),
            forecast.is_some()
        );

        self.draw_panel(&mut frame, &layout, today);
        self.draw_agenda(&mut frame, &layout, days);

        // Gutter rule
        fill(&mut frame.black.clipped(&layout.gutter_area()), layout.gutter_area());

        if let Some(slots) = forecast {
            self.draw_forecast(&mut frame, &layout, slots);
        }

        frame
    }

    /// Left panel: weekday, big day-of-month, month and the mini calendar,
    /// knocked out of a solid black block.
    fn draw_panel(&self, frame: &mut Frame, layout: &Layout, today: NaiveDate) {
        let fonts = &self.context.fonts;
        let area = layout.panel_area();
        let mut black = frame.black.clipped(&area);
        let mut red = frame.red.clipped(&area);
        let center_x = layout.panel_width / 2;

        fill(&mut black, area);

        let weekday = today.format("%A").to_string();
        text(&mut black, &weekday, Point::new(center_x, 30), fonts.label, BinaryColor::Off, Baseline::Top);

        // Day of month: white in the black plane, solid in the red plane,
        // inside a frame drawn in both
        let day = today.day().to_string();
        let big_height = (fonts.big.character_size.height * fonts.big_scale) as i32;
        let number_top = 66;
        let frame_box = RoundedRectangle::with_equal_corners(
            band(center_x - 56, number_top - 8, center_x + 56, number_top + big_height + 8),
            Size::new(8, 8),
        );
        frame_box
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::Off, 2))
            .draw(&mut black)
            .ok();
        frame_box
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 2))
            .draw(&mut red)
            .ok();

        let number_at = Point::new(center_x, number_top);
        scaled_text(&mut black, &day, number_at, fonts.big, fonts.big_scale, BinaryColor::Off, Baseline::Top);
        scaled_text(&mut red, &day, number_at, fonts.big, fonts.big_scale, BinaryColor::On, Baseline::Top);

        let month = today.format("%B").to_string();
        let month_y = number_top + big_height + 16;
        text(&mut black, &month, Point::new(center_x, month_y), fonts.label, BinaryColor::Off, Baseline::Top);

        self.draw_month(&mut black, &mut red, layout, today);
    }

    fn draw_month<B, R>(&self, black: &mut B, red: &mut R, layout: &Layout, today: NaiveDate)
    where
        B: DrawTarget<Color = BinaryColor, Error = Infallible>,
        R: DrawTarget<Color = BinaryColor, Error = Infallible>,
    {
        let font = self.context.fonts.small;
        let (x0, y0) = (layout.calendar_x, layout.calendar_y);
        let (col, row) = (layout.calendar_col, layout.calendar_row);

        for (i, letter) in WEEKDAY_LETTERS.iter().enumerate() {
            text(black, letter, Point::new(x0 + i as i32 * col, y0 - 1), font, BinaryColor::Off, Baseline::Top);
        }

        // Rule under the headers
        band(x0 - 12, y0 + 12, x0 + 7 * col - 14, y0 + 14)
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
            .draw(black)
            .ok();

        for cell in month_grid(today) {
            let at = Point::new(x0 + cell.column as i32 * col, y0 + row + cell.row as i32 * row);
            let label = cell.day.to_string();
            text(black, &label, at, font, BinaryColor::Off, Baseline::Top);
            if cell.day == today.day() {
                text(red, &label, at, font, BinaryColor::On, Baseline::Top);
            }
        }
    }

    fn draw_agenda(&self, frame: &mut Frame, layout: &Layout, days: &[Day]) {
        let font = self.context.fonts.main_text;
        let area = layout.agenda_area();
        let mut black = frame.black.clipped(&area);
        let mut red = frame.red.clipped(&area);

        let lines = layout_agenda(days, layout);
        let total: usize = days.iter().map(|day| 1 + day.events.len()).sum();
        if lines.len() < total {
            tracing::debug!("agenda truncated: {} of {} lines drawn", lines.len(), total);
        }

        for line in lines {
            let at = Point::new(layout.agenda_x, line.y);
            let style = MonoTextStyle::new(font, BinaryColor::On);
            let drawn = Text::with_baseline(&line.text, at, style, Baseline::Top);
            if line.accent {
                drawn.draw(&mut red).ok();
            } else {
                drawn.draw(&mut black).ok();
            }
        }
    }

    /// Near-term slots, a divider, then the daily slots at the same stride.
    fn draw_forecast(&self, frame: &mut Frame, layout: &Layout, slots: &ForecastSlots) {
        let fonts = &self.context.fonts;
        let area = layout.strip_area();
        let mut black = frame.black.clipped(&area);
        let mut red = frame.red.clipped(&area);
        let g = layout.gutter_y;

        let mut x = layout.slot_first_x;
        for slot in &slots.near_term {
            text(&mut red, &slot.time_label(), Point::new(x, g + 20), fonts.label, BinaryColor::On, Baseline::Top);
            let glyph = slot.glyph.to_string();
            scaled_text(&mut black, &glyph, Point::new(x, g + 65), fonts.glyph, fonts.glyph_scale, BinaryColor::On, Baseline::Middle);
            text(&mut black, &slot.temperature_label(), Point::new(x, g + 100), fonts.label, BinaryColor::On, Baseline::Top);
            x += layout.slot_stride;
        }

        fill(&mut black, band(x - 21, g, x - 18, layout.height));

        x += layout.slot_stride / 2;
        for slot in &slots.daily {
            text(&mut red, &slot.weekday_label(), Point::new(x, g + 20), fonts.label, BinaryColor::On, Baseline::Top);
            let glyph = slot.glyph.to_string();
            scaled_text(&mut black, &glyph, Point::new(x, g + 65), fonts.glyph, fonts.glyph_scale, BinaryColor::On, Baseline::Middle);
            text(&mut black, &slot.max_label(), Point::new(x - 15, g + 100), fonts.label, BinaryColor::On, Baseline::Top);
            text(&mut black, &slot.min_label(), Point::new(x + 15, g + 104), fonts.small, BinaryColor::On, Baseline::Top);
            x += layout.slot_stride;
        }
    }
}

/// Solid ink over `area`.
fn fill<D>(target: &mut D, area: Rectangle)
where
    D: DrawTarget<Color = BinaryColor, Error = Infallible>,
{
    area.into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
        .draw(target)
        .ok();
}

/// Horizontally centred text.
fn text<D>(target: &mut D, s: &str, at: Point, font: &MonoFont<'_>, color: BinaryColor, baseline: Baseline)
where
    D: DrawTarget<Color = BinaryColor, Error = Infallible>,
{
    let style = MonoTextStyle::new(font, color);
    let placement = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(baseline)
        .build();
    Text::with_text_style(s, at, style, placement).draw(target).ok();
}

/// Horizontally centred text magnified `scale` times about `at`.
fn scaled_text<D>(
    target: &mut D,
    s: &str,
    at: Point,
    font: &MonoFont<'_>,
    scale: u32,
    color: BinaryColor,
    baseline: Baseline,
) where
    D: DrawTarget<Color = BinaryColor, Error = Infallible>,
{
    let mut scaled = Scaled::new(target, at, scale);
    text(&mut scaled, s, Point::zero(), font, color, baseline);
}

/// Draw target that magnifies every pixel into a `scale`×`scale` block
/// placed relative to `origin`.
pub struct Scaled<'a, D> {
    target: &'a mut D,
    origin: Point,
    scale: u32,
}

impl<'a, D> Scaled<'a, D> {
    pub fn new(target: &'a mut D, origin: Point, scale: u32) -> Self {
        Self {
            target,
            origin,
            scale: scale.max(1),
        }
    }
}

impl<D: DrawTarget> Dimensions for Scaled<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        let inner = self.target.bounding_box();
        let scale = self.scale as i32;
        Rectangle::new(
            (inner.top_left - self.origin) / scale,
            inner.size / self.scale + Size::new(1, 1),
        )
    }
}

impl<D: DrawTarget> DrawTarget for Scaled<'_, D> {
    type Color = D::Color;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let block = Size::new(self.scale, self.scale);
        for Pixel(point, color) in pixels {
            let top_left = self.origin + point * self.scale as i32;
            self.target.fill_solid(&Rectangle::new(top_left, block), color)?;
        }
        Ok(())
    }
}
