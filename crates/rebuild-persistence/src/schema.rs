//! Esquema Diesel. Reemplazable con `diesel print-schema`.

diesel::table! {
    objects (kind, name) {
        kind -> Text,
        name -> Text,
        resource_version -> Int8,
        body -> Jsonb,
        updated_at -> Timestamptz,
    }
}
