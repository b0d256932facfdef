//! Type-indexed parser registry.
//!
//! Maps a result type to a factory for its parser. Entries are added by
//! explicit `register` calls at startup; lookups are checked at compile time
//! for the result type and at run time for presence.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::{debug, error};

use super::{
    ChecksumParser, LifetimeTelemetry, LifetimeTelemetryParser, PacketParser, PowerupTelemetry,
    PowerupTelemetryParser, Revlev, RevlevParser, SerialConfig, SerialConfigParser,
};
use crate::protocol::Packet;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid registration for {result}: {reason}")]
    InvalidRegistration { result: &'static str, reason: String },

    #[error("No parser registered for {result}")]
    NotRegistered { result: &'static str },
}

type Factory<R> = Box<dyn Fn() -> Box<dyn PacketParser<Output = R>> + Send + Sync>;

struct Entry {
    parser: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

/// Registry of parser factories keyed by result type.
#[derive(Default)]
pub struct ParserRegistry {
    entries: HashMap<TypeId, Entry>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every parser this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Process-wide registry, built on first use.
    pub fn global() -> &'static ParserRegistry {
        static GLOBAL: OnceLock<ParserRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_defaults)
    }

    fn register_defaults(&mut self) {
        let results = [
            self.register::<Revlev, RevlevParser>(),
            self.register::<u32, ChecksumParser>(),
            self.register::<PowerupTelemetry, PowerupTelemetryParser>(),
            self.register::<LifetimeTelemetry, LifetimeTelemetryParser>(),
            self.register::<SerialConfig, SerialConfigParser>(),
        ];
        for err in results.into_iter().filter_map(Result::err) {
            error!(error = %err, "Default parser registration failed");
        }
    }

    /// Bind result type `R` to parser `P`.
    ///
    /// A result type can be bound once; a second binding is rejected.
    pub fn register<R, P>(&mut self) -> Result<(), RegistryError>
    where
        R: 'static,
        P: PacketParser<Output = R> + Default + 'static,
    {
        let key = TypeId::of::<R>();
        if let Some(existing) = self.entries.get(&key) {
            return Err(RegistryError::InvalidRegistration {
                result: type_name::<R>(),
                reason: format!("already bound to {}", existing.parser),
            });
        }

        let factory: Factory<R> =
            Box::new(|| Box::new(P::default()) as Box<dyn PacketParser<Output = R>>);
        self.entries.insert(
            key,
            Entry {
                parser: type_name::<P>(),
                factory: Box::new(factory),
            },
        );
        debug!(result = type_name::<R>(), parser = type_name::<P>(), "Parser registered");
        Ok(())
    }

    /// Instantiate the parser bound to `R`.
    pub fn create<R: 'static>(&self) -> Result<Box<dyn PacketParser<Output = R>>, RegistryError> {
        let not_registered = || RegistryError::NotRegistered {
            result: type_name::<R>(),
        };
        let entry = self.entries.get(&TypeId::of::<R>()).ok_or_else(not_registered)?;
        let factory = entry
            .factory
            .downcast_ref::<Factory<R>>()
            .ok_or_else(not_registered)?;
        Ok(factory())
    }

    /// Parse `packet` with the parser bound to `R`.
    pub fn parse<R: 'static>(&self, packet: &Packet) -> Result<Option<R>, RegistryError> {
        Ok(self.create::<R>()?.parse(packet))
    }

    pub fn is_registered<R: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FirstByte;

    impl PacketParser for FirstByte {
        type Output = u8;

        fn parse(&self, packet: &Packet) -> Option<u8> {
            packet.as_bytes().first().copied()
        }
    }

    #[derive(Default)]
    struct LastByte;

    impl PacketParser for LastByte {
        type Output = u8;

        fn parse(&self, packet: &Packet) -> Option<u8> {
            packet.as_bytes().last().copied()
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = ParserRegistry::new();
        registry.register::<u8, FirstByte>().unwrap();
        let parser = registry.create::<u8>().unwrap();
        assert_eq!(parser.parse(&Packet::from_bytes(&[7, 8])), Some(7));
        assert_eq!(parser.parse(&Packet::new()), None);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ParserRegistry::new();
        registry.register::<u8, FirstByte>().unwrap();
        let err = registry.register::<u8, LastByte>().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRegistration { .. }));
        // First binding wins.
        assert_eq!(registry.parse::<u8>(&Packet::from_bytes(&[1, 2])), Ok(Some(1)));
    }

    #[test]
    fn test_not_registered() {
        let registry = ParserRegistry::new();
        assert!(matches!(
            registry.create::<Revlev>(),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let registry = ParserRegistry::global();
        assert_eq!(registry.len(), 5);
        assert!(registry.is_registered::<Revlev>());
        assert!(registry.is_registered::<u32>());
        assert!(registry.is_registered::<SerialConfig>());
        assert_eq!(
            registry.parse::<u32>(&Packet::from_bytes(&[0xDE, 0xAD, 0xBE, 0xEF])),
            Ok(Some(0xDEADBEEF))
        );
    }
}
