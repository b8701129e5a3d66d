//! Cross-module tests driving the binary's pipeline without network or hardware.
