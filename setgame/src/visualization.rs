use crate::{all_slots, Card, Slot};

const CELL_WIDTH: usize = 5;

/// Renders the table as a grid of card ids.
///
/// `tokens` holds the token slots of every player; a slot carrying tokens gets
/// one `*` per player after its card. Empty slots are drawn as `·`.
pub fn visualize_table(
    slot_to_card: &[Option<Card>],
    tokens: &[Vec<Slot>],
    columns: usize,
) -> String {
    let columns = columns.max(1);

    let mut result = String::from("    ");
    for j in 0..columns {
        result += &format!("{:>width$}", j, width = CELL_WIDTH);
    }
    result += "\n    ╭";
    result += &"─".repeat(CELL_WIDTH * columns);
    result += "╮";

    for slot in all_slots(slot_to_card.len()) {
        let (row, column) = slot.coordinates(columns);
        if column == 0 {
            if row > 0 {
                result += "│";
            }
            result += &format!("\n{:>3} │", row);
        }
        let marks = tokens.iter().filter(|slots| slots.contains(&slot)).count();
        let cell = match slot_to_card[slot.index()] {
            Some(card) => format!("{:>2}{}", card.0, "*".repeat(marks)),
            None => String::from(" ·"),
        };
        result += &format!(" {:<width$}", cell, width = CELL_WIDTH - 1);
    }
    if !slot_to_card.is_empty() {
        // Pad a partial last row.
        let filled = (slot_to_card.len() - 1) % columns + 1;
        result += &" ".repeat(CELL_WIDTH * (columns - filled));
        result += "│";
    }

    result += "\n    ╰";
    result += &"─".repeat(CELL_WIDTH * columns);
    result += "╯";
    result
}
