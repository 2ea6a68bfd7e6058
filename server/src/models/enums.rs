//! Enumerated types stored as short string values.
//!
//! Each enum carries its database value and a human-readable description in a
//! static lookup, and maps to/from `Text` columns so row structs can hold the
//! typed value directly.

/// Declare an enum whose variants map to a short database value plus a
/// display description, with diesel `Text` and serde round-tripping.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => ($value:literal, $desc:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            diesel::expression::AsExpression, diesel::deserialize::FromSqlRow,
        )]
        #[diesel(sql_type = diesel::sql_types::Text)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// The short value stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $value),+ }
            }

            /// Human-readable description.
            pub fn description(&self) -> &'static str {
                match self { $(Self::$variant => $desc),+ }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("invalid ", stringify!($name), " value: {:?}"),
                        other
                    )),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl diesel::serialize::ToSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
            ) -> diesel::serialize::Result {
                std::io::Write::write_all(out, self.as_str().as_bytes())?;
                Ok(diesel::serialize::IsNull::No)
            }
        }

        impl diesel::deserialize::FromSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn from_sql(
                bytes: diesel::pg::PgValue<'_>,
            ) -> diesel::deserialize::Result<Self> {
                let s = std::str::from_utf8(bytes.as_bytes())?;
                s.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

text_enum! {
    /// Family of artifacts an update's builds belong to.
    ContentType {
        Base => ("base", "Base"),
        Rpm => ("rpm", "RPM"),
        Module => ("module", "Module"),
    }
}

text_enum! {
    /// Current position of an update in its lifecycle.
    UpdateStatus {
        Pending => ("pending", "pending"),
        Testing => ("testing", "testing"),
        Stable => ("stable", "stable"),
        Unpushed => ("unpushed", "unpushed"),
        Obsolete => ("obsolete", "obsolete"),
        Processing => ("processing", "processing"),
    }
}

text_enum! {
    /// Pending desired transition for an update.
    UpdateRequest {
        Testing => ("testing", "testing"),
        Batched => ("batched", "batched"),
        Obsolete => ("obsolete", "obsolete"),
        Unpush => ("unpush", "unpush"),
        Revoke => ("revoke", "revoke"),
        Stable => ("stable", "stable"),
    }
}

text_enum! {
    UpdateType {
        Bugfix => ("bugfix", "bugfix"),
        Security => ("security", "security"),
        NewPackage => ("newpackage", "newpackage"),
        Enhancement => ("enhancement", "enhancement"),
    }
}

text_enum! {
    UpdateSeverity {
        Unspecified => ("unspecified", "unspecified"),
        Urgent => ("urgent", "urgent"),
        High => ("high", "high"),
        Medium => ("medium", "medium"),
        Low => ("low", "low"),
    }
}

text_enum! {
    UpdateSuggestion {
        Unspecified => ("unspecified", "unspecified"),
        Reboot => ("reboot", "reboot"),
        Logout => ("logout", "logout"),
    }
}

text_enum! {
    /// Outcome reported by the external test-gating oracle. An update created
    /// while gating is disabled has no status at all (`None` in the column).
    TestGatingStatus {
        Waiting => ("waiting", "Waiting"),
        Ignored => ("ignored", "Ignored"),
        Queued => ("queued", "Queued"),
        Running => ("running", "Running"),
        Passed => ("passed", "Passed"),
        Failed => ("failed", "Failed"),
    }
}

text_enum! {
    ReleaseState {
        Disabled => ("disabled", "disabled"),
        Pending => ("pending", "pending"),
        Current => ("current", "current"),
        Archived => ("archived", "archived"),
    }
}
