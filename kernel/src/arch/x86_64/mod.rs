//! Architecture x86_64 support
//!
//! Ce module gère les spécificités x86_64 de l'initialisation NUMA :
//! - Sélection de la source de topologie au boot (`numa`)
//! - Découverte vNUMA pour les invités Xen PV (`xen`)

pub mod numa;
pub mod xen;
