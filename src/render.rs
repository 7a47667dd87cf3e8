//! Terminal output rendering for the interactive CLI.

use crate::transcript::{ConversationTurn, TurnRole};
use crate::types::{Cart, Order, Product};
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

/// Minimal terminal renderer. Styling degrades to plain text when color is
/// disabled (`--no-color` or `display.color = false`).
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// Connection/status line on stderr so it never interleaves with chat
    /// text on stdout.
    pub fn status(&self, text: &str) {
        eprintln!("{}", self.paint(text, Color::DarkGrey));
    }

    pub fn warn(&self, text: &str) {
        eprintln!("{}", self.paint(&format!("warning: {text}"), Color::Yellow));
    }

    pub fn error(&self, text: &str) {
        eprintln!("{}", self.paint(&format!("error: {text}"), Color::Red));
    }

    /// Label line opening an assistant turn; deltas append after it.
    pub fn assistant_label(&self, agent: Option<&str>) {
        let label = match agent {
            Some(agent) => format!("assistant ({agent})"),
            None => "assistant".to_string(),
        };
        println!("{}", self.paint(&label, Color::Cyan));
    }

    /// Incremental streamed text; flushed without a newline.
    pub fn delta(&self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }

    /// Terminate a streamed turn's output.
    pub fn end_turn(&self) {
        println!();
    }

    /// A complete turn, label and body in one go.
    pub fn turn(&self, turn: &ConversationTurn) {
        match turn.role {
            TurnRole::User => {
                println!("{} {}", self.paint("you:", Color::Green), turn.text);
            }
            TurnRole::Assistant => {
                self.assistant_label(turn.agent.as_deref());
                println!("{}", turn.text);
            }
        }
    }

    pub fn product(&self, product: &Product) {
        let price = format!("{:.2} {}", product.price, product.currency);
        println!(
            "{}  {}  {}",
            self.paint(&product.id, Color::DarkGrey),
            product.name,
            self.paint(&price, Color::Green),
        );
        for variant in &product.variants {
            let stock = if variant.in_stock { "in stock" } else { "out of stock" };
            println!(
                "    {}  {} / {}  ({stock})",
                self.paint(&variant.id, Color::DarkGrey),
                variant.size,
                variant.color,
            );
        }
    }

    pub fn cart(&self, cart: &Cart) {
        if cart.items.is_empty() {
            println!("cart is empty");
            return;
        }
        for item in &cart.items {
            println!(
                "{}  {} x{}  {:.2}",
                self.paint(&item.item_id, Color::DarkGrey),
                item.name,
                item.quantity,
                item.price,
            );
        }
        println!(
            "subtotal {:.2}  tax {:.2}  shipping {:.2}  discount {:.2}",
            cart.subtotal, cart.tax, cart.shipping, cart.discount
        );
        let total = format!("total {:.2} {} ({} items)", cart.total, cart.currency, cart.item_count);
        println!("{}", self.paint(&total, Color::Green));
    }

    pub fn order(&self, order: &Order) {
        println!(
            "{}  {}  {:.2}  {}",
            self.paint(&order.id, Color::DarkGrey),
            order.status,
            order.total,
            order.created_at,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_is_identity_without_color() {
        let renderer = Renderer::new(false);
        assert_eq!(renderer.paint("hello", Color::Red), "hello");
    }

    #[test]
    fn paint_adds_escapes_with_color() {
        let renderer = Renderer::new(true);
        let painted = renderer.paint("hello", Color::Red);
        assert!(painted.contains("hello"));
        assert!(painted.len() > "hello".len());
    }
}
