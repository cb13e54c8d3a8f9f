use anyhow::Result;

/// LED identification scheme bound to one sensor.
///
/// The matching logic (which observed blob is which physical LED) belongs to
/// the tracking engine's side. The harness only creates identifiers and hands
/// them to sensor registration.
pub trait LedIdentifier: Send {
    /// Scheme name, for logs.
    fn name(&self) -> &str;

    /// Sensor slot this identifier was created for.
    fn slot(&self) -> usize;
}

/// Produces one identifier per sensor slot.
pub trait IdentifierFactory {
    fn create(&self, slot: usize) -> Result<Box<dyn LedIdentifier>>;
}

impl<F> IdentifierFactory for F
where
    F: Fn(usize) -> Result<Box<dyn LedIdentifier>>,
{
    fn create(&self, slot: usize) -> Result<Box<dyn LedIdentifier>> {
        self(slot)
    }
}

/// Identifier that only remembers its slot. Engines that do their own
/// identification (like `StubEngine`) need nothing more.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotIdentifier {
    slot: usize,
}

impl SlotIdentifier {
    pub fn new(slot: usize) -> Self {
        Self { slot }
    }
}

impl LedIdentifier for SlotIdentifier {
    fn name(&self) -> &str {
        "slot"
    }

    fn slot(&self) -> usize {
        self.slot
    }
}

/// Factory for `SlotIdentifier`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotIdentifierFactory;

impl IdentifierFactory for SlotIdentifierFactory {
    fn create(&self, slot: usize) -> Result<Box<dyn LedIdentifier>> {
        Ok(Box::new(SlotIdentifier::new(slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn slot_factory_binds_slots() -> Result<()> {
        let identifier = SlotIdentifierFactory.create(3)?;
        assert_eq!(identifier.slot(), 3);
        assert_eq!(identifier.name(), "slot");
        Ok(())
    }

    #[test]
    fn closures_are_factories() {
        let only_first = |slot: usize| -> Result<Box<dyn LedIdentifier>> {
            if slot == 0 {
                Ok(Box::new(SlotIdentifier::new(slot)))
            } else {
                Err(anyhow!("no identifier for slot {}", slot))
            }
        };
        assert!(only_first.create(0).is_ok());
        assert!(only_first.create(1).is_err());
    }
}
