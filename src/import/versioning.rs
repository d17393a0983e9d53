//! Filling in versions for descriptors whose manifest did not state one

use crate::archive::ArchiveFingerprint;
use crate::mods::{ModDescriptor, SourceKind, VersionSource};
use crate::remote::{RelayService, TelemetryEvent, TelemetrySink};

/// Descriptors that still need a version from somewhere
pub(crate) fn needs_version(descriptor: &ModDescriptor) -> bool {
    matches!(descriptor.kind, SourceKind::Native | SourceKind::Virtual)
        && descriptor.is_valid()
        && descriptor.version.source.is_none()
        && !descriptor.version.is_pending_check()
}

pub(crate) struct VersionReconciler<'a> {
    relay: &'a dyn RelayService,
    telemetry: &'a dyn TelemetrySink,
}

impl<'a> VersionReconciler<'a> {
    pub(crate) fn new(relay: &'a dyn RelayService, telemetry: &'a dyn TelemetrySink) -> Self {
        Self { relay, telemetry }
    }

    /// Resolve versions from the matched record, then the relay, else mark unknown.
    /// The relay is asked at most once per archive.
    pub(crate) async fn reconcile(
        &self,
        descriptors: &mut [ModDescriptor],
        record_version: Option<&str>,
        fingerprint: Option<&ArchiveFingerprint>,
    ) {
        let mut relay_answer: Option<Option<String>> = None;

        for descriptor in descriptors.iter_mut().filter(|d| needs_version(d)) {
            if let Some(version) = record_version.filter(|v| !v.trim().is_empty()) {
                descriptor.version.try_assign(version, VersionSource::IdentificationRecord);
                continue;
            }

            let Some(fingerprint) = fingerprint else {
                self.mark_unversioned(descriptor, None);
                continue;
            };

            if relay_answer.is_none() {
                relay_answer = Some(match self.relay.query_version(fingerprint).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        tracing::warn!("Relay version query failed: {:#}", e);
                        None
                    }
                });
            }

            match relay_answer.as_ref().and_then(|a| a.as_deref()) {
                Some(version) => {
                    descriptor.version.try_assign(version, VersionSource::RelayQuery);
                }
                None => self.mark_unversioned(descriptor, Some(fingerprint)),
            }
        }
    }

    fn mark_unversioned(&self, descriptor: &mut ModDescriptor, fingerprint: Option<&ArchiveFingerprint>) {
        descriptor.version.mark_unknown();
        tracing::info!("No version is tracked for {}", descriptor.identity);
        self.telemetry.track(TelemetryEvent::UnversionedContent {
            name: descriptor.identity.name.clone(),
            md5: fingerprint.map(|f| f.md5.clone()),
            size: fingerprint.map(|f| f.size),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::GameType;
    use crate::mods::{DescriptorVersion, Identity};
    use crate::remote::{MockRelayService, MockTelemetrySink};
    use anyhow::anyhow;

    fn fingerprint() -> ArchiveFingerprint {
        ArchiveFingerprint {
            md5: "abc".to_string(),
            size: 10,
        }
    }

    fn virtual_mod(name: &str) -> ModDescriptor {
        ModDescriptor::new(Identity::new(name, "Dev", Some(GameType::ME3)), SourceKind::Virtual)
    }

    #[tokio::test]
    async fn test_record_version_wins() {
        let mut relay = MockRelayService::new();
        relay.expect_query_version().never();
        let mut telemetry = MockTelemetrySink::new();
        telemetry.expect_track().never();

        let mut mods = vec![virtual_mod("A")];
        VersionReconciler::new(&relay, &telemetry)
            .reconcile(&mut mods, Some("2.0"), Some(&fingerprint()))
            .await;

        assert_eq!(mods[0].version.raw, "2.0");
        assert_eq!(mods[0].version.source, Some(VersionSource::IdentificationRecord));
    }

    #[tokio::test]
    async fn test_relay_is_queried_once() {
        let mut relay = MockRelayService::new();
        relay
            .expect_query_version()
            .times(1)
            .returning(|_| Ok(Some("1.5".to_string())));
        let telemetry = MockTelemetrySink::new();

        let mut mods = vec![virtual_mod("A"), virtual_mod("B")];
        VersionReconciler::new(&relay, &telemetry)
            .reconcile(&mut mods, None, Some(&fingerprint()))
            .await;

        assert!(mods
            .iter()
            .all(|m| m.version.raw == "1.5" && m.version.source == Some(VersionSource::RelayQuery)));
    }

    #[tokio::test]
    async fn test_unknown_emits_telemetry() {
        let mut relay = MockRelayService::new();
        relay.expect_query_version().returning(|_| Err(anyhow!("offline")));
        let mut telemetry = MockTelemetrySink::new();
        telemetry
            .expect_track()
            .withf(|e| matches!(e, TelemetryEvent::UnversionedContent { name, .. } if name == "A"))
            .times(1)
            .return_const(());

        let mut mods = vec![virtual_mod("A")];
        VersionReconciler::new(&relay, &telemetry)
            .reconcile(&mut mods, None, Some(&fingerprint()))
            .await;

        assert_eq!(mods[0].version.source, Some(VersionSource::Unknown));
        assert_eq!(mods[0].version.raw, "0.0");
    }

    #[tokio::test]
    async fn test_unknown_without_fingerprint_emits_telemetry() {
        let mut relay = MockRelayService::new();
        relay.expect_query_version().never();
        let mut telemetry = MockTelemetrySink::new();
        telemetry
            .expect_track()
            .withf(|e| {
                matches!(
                    e,
                    TelemetryEvent::UnversionedContent { name, md5: None, size: None } if name == "A"
                )
            })
            .times(1)
            .return_const(());

        let mut mods = vec![virtual_mod("A")];
        VersionReconciler::new(&relay, &telemetry)
            .reconcile(&mut mods, None, None)
            .await;

        assert_eq!(mods[0].version.source, Some(VersionSource::Unknown));
    }

    #[tokio::test]
    async fn test_skips_trusted_pending_and_failed() {
        let mut relay = MockRelayService::new();
        relay.expect_query_version().never();
        let telemetry = MockTelemetrySink::new();

        let mut embedded = virtual_mod("Embedded");
        embedded.version = DescriptorVersion::embedded("3.1");
        let mut pending = virtual_mod("Pending");
        pending.version = DescriptorVersion::pending_check();
        let mut failed = virtual_mod("Failed");
        failed.fail("blocked");
        let texture = ModDescriptor::new(Identity::new("Tex", "Dev", None), SourceKind::Texture);

        let mut mods = vec![embedded, pending, failed, texture];
        VersionReconciler::new(&relay, &telemetry)
            .reconcile(&mut mods, None, Some(&fingerprint()))
            .await;

        assert_eq!(mods[0].version.source, Some(VersionSource::Embedded));
        assert!(mods[1].version.is_pending_check());
        assert_eq!(mods[2].version.source, None);
        assert_eq!(mods[3].version.source, None);
    }

    #[test]
    fn test_relay_never_overrides_record() {
        let mut descriptor = virtual_mod("A");
        assert!(descriptor
            .version
            .try_assign("2.0", VersionSource::IdentificationRecord));
        assert!(!descriptor.version.try_assign("9.9", VersionSource::RelayQuery));
        assert_eq!(descriptor.version.raw, "2.0");
    }
}
