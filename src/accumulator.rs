//! Type-erased value stack shared by all steps of one composed decoder session.
//!
//! Values produced by steps are pushed as [`Element`]s. Reads come in two flavours:
//!
//! - **Stack reads** ([`pop`](ElementsAccumulator::pop),
//!   [`peek`](ElementsAccumulator::peek)) take the most recent value.
//! - **Ordered reads** ([`next`](ElementsAccumulator::next)) walk a *layer* from its start,
//!   oldest value first. Reading the last value of a layer closes it: its values are
//!   dropped and the enclosing layer becomes active again. Closing the outermost layer
//!   empties the accumulator.
//!
//! Layers nest strictly: a new layer always starts above the start of the active one.
//! Recursive decoding opens a layer per nesting level; reductions open a short-lived
//! read-back layer over the values they consume.
//!
//! Asking for a value of the wrong type is a bug in the composition and panics.

use std::any::{self, Any};
use std::fmt;

pub type Element = Box<dyn Any + Send>;

#[derive(Default)]
pub struct ElementsAccumulator {
    elements: Vec<Element>,
    /// Starts of the open nested layers. The outermost layer starts at 0 and is implicit.
    layers: Vec<usize>,
    cursor: usize,
}

impl ElementsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of nested layers currently open.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    fn layer_start(&self) -> usize {
        self.layers.last().copied().unwrap_or(0)
    }

    /// Values in the active layer.
    pub fn layer_len(&self) -> usize {
        self.elements.len() - self.layer_start()
    }

    pub fn push<T: Any + Send>(&mut self, value: T) {
        self.elements.push(Box::new(value));
    }

    pub fn push_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Remove and return the most recent value.
    ///
    /// # Panics
    ///
    /// Panics if the accumulator is empty or the value is not a `T`.
    pub fn pop<T: Any>(&mut self) -> T {
        match self.elements.pop() {
            Some(element) => downcast(element),
            None => panic!("pop::<{}> on an empty accumulator", any::type_name::<T>()),
        }
    }

    /// Borrow the most recent value.
    ///
    /// # Panics
    ///
    /// Panics if the accumulator is empty or the value is not a `T`.
    pub fn peek<T: Any>(&self) -> &T {
        let element = match self.elements.last() {
            Some(element) => element,
            None => panic!("peek::<{}> on an empty accumulator", any::type_name::<T>()),
        };
        match element.downcast_ref::<T>() {
            Some(value) => value,
            None => panic!("accumulated value is not a `{}`", any::type_name::<T>()),
        }
    }

    /// Open a layer starting at the current top of the stack.
    ///
    /// # Panics
    ///
    /// Panics if the new layer would not start above the active one.
    pub fn open_layer(&mut self) {
        let start = self.elements.len();
        assert!(
            start > self.layer_start(),
            "layer at {} must start above the active layer at {}",
            start,
            self.layer_start()
        );
        self.layers.push(start);
        self.cursor = start;
    }

    /// Prepare ordered reads of the last `n` values.
    ///
    /// When the `n` values make up the whole active layer, that layer is read directly and
    /// closes after the last read; otherwise a read-back layer is opened over them.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or larger than the active layer.
    pub fn read_back(&mut self, n: usize) {
        let start = self.layer_start();
        let available = self.elements.len() - start;
        assert!(
            n > 0 && n <= available,
            "cannot read back {} values from a layer holding {}",
            n,
            available
        );
        let from = self.elements.len() - n;
        if from > start {
            self.layers.push(from);
        }
        self.cursor = from;
    }

    /// Take the next value of the active layer in push order.
    ///
    /// # Panics
    ///
    /// Panics if the layer has been read to its end or the value is not a `T`.
    pub fn next<T: Any>(&mut self) -> T {
        downcast(self.next_element())
    }

    pub fn next_element(&mut self) -> Element {
        let end = self.elements.len();
        assert!(self.cursor < end, "no value left to read in the active layer");
        // Box<()> does not allocate.
        let element = std::mem::replace(&mut self.elements[self.cursor], Box::new(()));
        self.cursor += 1;
        if self.cursor == end {
            self.close_layer();
        }
        element
    }

    fn close_layer(&mut self) {
        match self.layers.pop() {
            Some(start) => {
                self.elements.truncate(start);
                self.cursor = self.layer_start();
            }
            None => self.clear(),
        }
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.layers.clear();
        self.cursor = 0;
    }
}

impl fmt::Debug for ElementsAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementsAccumulator")
            .field("len", &self.elements.len())
            .field("layers", &self.layers)
            .field("cursor", &self.cursor)
            .finish()
    }
}

fn downcast<T: Any>(element: Element) -> T {
    match element.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => panic!("accumulated value is not a `{}`", any::type_name::<T>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_and_peek_take_latest() {
        let mut acc = ElementsAccumulator::new();
        acc.push(1u8);
        acc.push("two".to_string());
        assert_eq!(acc.peek::<String>(), "two");
        assert_eq!(acc.pop::<String>(), "two");
        assert_eq!(acc.pop::<u8>(), 1);
        assert!(acc.is_empty());
    }

    #[test]
    #[should_panic(expected = "is not a")]
    fn wrong_type_panics() {
        let mut acc = ElementsAccumulator::new();
        acc.push(1u8);
        let _: u32 = acc.pop();
    }

    #[test]
    fn reading_whole_outer_layer_clears() {
        let mut acc = ElementsAccumulator::new();
        acc.push(1u8);
        acc.push(2u16);
        acc.read_back(2);
        assert_eq!(acc.next::<u8>(), 1);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.next::<u16>(), 2);
        assert!(acc.is_empty());
    }

    #[test]
    fn partial_read_back_keeps_older_values() {
        let mut acc = ElementsAccumulator::new();
        acc.push(1u8);
        acc.push(2u8);
        acc.push(3u8);
        acc.read_back(2);
        assert_eq!(acc.depth(), 1);
        assert_eq!(acc.next::<u8>(), 2);
        assert_eq!(acc.next::<u8>(), 3);
        assert_eq!(acc.depth(), 0);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.pop::<u8>(), 1);
    }

    #[test]
    fn nested_layer_closes_back_to_parent() {
        let mut acc = ElementsAccumulator::new();
        acc.push("outer");
        acc.open_layer();
        acc.push(10u8);
        acc.push(20u8);
        assert_eq!(acc.layer_len(), 2);
        acc.read_back(2);
        // Whole layer requested: no extra read-back layer.
        assert_eq!(acc.depth(), 1);
        assert_eq!(acc.next::<u8>() + acc.next::<u8>(), 30);
        assert_eq!(acc.depth(), 0);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.layer_len(), 1);
        assert_eq!(acc.pop::<&str>(), "outer");
    }

    #[test]
    #[should_panic(expected = "must start above")]
    fn layers_must_nest_strictly() {
        let mut acc = ElementsAccumulator::new();
        acc.push(0u8);
        acc.open_layer();
        acc.open_layer();
    }

    #[test]
    #[should_panic(expected = "cannot read back")]
    fn read_back_is_bounded_by_active_layer() {
        let mut acc = ElementsAccumulator::new();
        acc.push(0u8);
        acc.open_layer();
        acc.push(1u8);
        acc.read_back(2);
    }
}
