use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

/// Accumulates a sequence of messages (e.g. validation failures).
#[derive(Default, Debug)]
pub struct MessageAccumulator {
    /// Accumulated messages.
    /// This is a `Rc<RefCell>` to support accumulators derived from `with_prefix()` accumulating to
    /// the same underlying collection.
    msgs: Rc<RefCell<Vec<String>>>,
    /// Optional prefix to all new messages, e.g. describing higher level context.
    prefix: String,
}

impl MessageAccumulator {
    /// Returns a new accumulator backed by the same collection, that will prefix each new message
    /// with a formatted string.
    pub fn with_prefix<S: AsRef<str>>(&self, prefix: S) -> Self {
        MessageAccumulator {
            msgs: self.msgs.clone(),
            prefix: self.prefix.to_owned() + prefix.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.msgs.borrow().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.msgs.borrow().to_owned()
    }

    /// Adds a message to the accumulator.
    pub fn add<S: AsRef<str>>(&self, msg: S) {
        self.msgs.borrow_mut().push(format!("{}{}", self.prefix, msg.as_ref()));
    }

    /// Adds a message to the accumulator if predicate is false.
    pub fn require<S: AsRef<str>>(&self, predicate: bool, msg: S) {
        if !predicate {
            self.add(msg);
        }
    }

    /// Adds a message if result is `Err`.
    pub fn require_no_error<V, E: Display, S: AsRef<str>>(&self, result: Result<V, E>, msg: S) {
        if let Err(e) = result {
            self.add(format!("{}: {}", msg.as_ref(), e));
        }
    }

    /// Panics if the accumulator contains any messages.
    pub fn assert_empty(&self) {
        assert!(self.is_empty(), "{}", self.messages().join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_messages() {
        let acc = MessageAccumulator::default();
        acc.add("Cthulhu");
        assert_eq!(1, acc.len());
        assert_eq!(acc.messages(), vec!["Cthulhu"]);

        acc.add("Azathoth");
        assert_eq!(2, acc.len());
        assert_eq!(acc.messages(), vec!["Cthulhu", "Azathoth"]);
    }

    #[test]
    fn adds_conditional_messages() {
        let acc = MessageAccumulator::default();
        acc.require(true, "Cthulhu");
        assert!(acc.is_empty());
        acc.require(false, "Azathoth");
        assert_eq!(acc.messages(), vec!["Azathoth"]);
    }

    #[test]
    fn prefixes_accumulate_to_parent() {
        let acc = MessageAccumulator::default();
        let prefixed = acc.with_prefix("elder: ");
        prefixed.add("Cthulhu");
        acc.add("Azathoth");
        assert_eq!(acc.messages(), vec!["elder: Cthulhu", "Azathoth"]);
    }
}
