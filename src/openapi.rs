//! OpenAPI document generated from the catalog at startup.

use crate::config::ApiSettings;
use crate::handlers::Operations;
use crate::interface::{FieldFormat, FieldSpec, Interface};
use crate::schema::{Catalog, LogicalType, TableEntry};
use utoipa::openapi::content::ContentBuilder;
use utoipa::openapi::info::InfoBuilder;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder, PathsBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::schema::{
    ArrayBuilder, ComponentsBuilder, KnownFormat, ObjectBuilder, Ref, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{OpenApi, OpenApiBuilder, RefOr, Required};

const JSON: &str = "application/json";

fn field_schema(field: &FieldSpec) -> Schema {
    let (ty, format) = match field.logical_type {
        LogicalType::Integer => (Type::Integer, Some(SchemaFormat::KnownFormat(KnownFormat::Int64))),
        LogicalType::Float => (Type::Number, Some(SchemaFormat::KnownFormat(KnownFormat::Double))),
        LogicalType::Decimal => (Type::Number, Some(SchemaFormat::Custom("decimal".into()))),
        LogicalType::Boolean => (Type::Boolean, None),
        LogicalType::DateTime => (Type::String, Some(SchemaFormat::Custom("iso-8601".into()))),
        LogicalType::Binary => (Type::String, Some(SchemaFormat::KnownFormat(KnownFormat::Byte))),
        LogicalType::Text if field.constraints.format == Some(FieldFormat::Uuid) => {
            (Type::String, Some(SchemaFormat::KnownFormat(KnownFormat::Uuid)))
        }
        LogicalType::Text | LogicalType::Enum => (Type::String, None),
        LogicalType::Opaque => {
            return Schema::Object(ObjectBuilder::new().schema_type(SchemaType::AnyValue).build());
        }
    };
    let schema_type = if field.nullable {
        SchemaType::Array(vec![ty, Type::Null])
    } else {
        SchemaType::Type(ty)
    };
    let allowed = &field.constraints.allowed;
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(schema_type)
            .format(format)
            .max_length(field.constraints.max_length.map(|n| n as usize))
            .enum_values((!allowed.is_empty()).then(|| allowed.clone()))
            .build(),
    )
}

fn interface_schema(interface: &Interface) -> Schema {
    let mut object = ObjectBuilder::new()
        .schema_type(Type::Object)
        .description(Some(interface.name.clone()));
    for field in &interface.fields {
        object = object.property(&field.name, field_schema(field));
        if field.required {
            object = object.required(&field.name);
        }
    }
    Schema::Object(object.build())
}

fn schema_ref(name: &str) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(name))
}

/// `{ "data": <item> }` or, for lists, `{ "data": [<item>], "meta": {...} }`.
fn envelope(item: RefOr<Schema>, many: bool) -> Schema {
    let data: RefOr<Schema> = if many {
        RefOr::T(Schema::Array(ArrayBuilder::new().items(item).build()))
    } else {
        item
    };
    let mut object = ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("data", data)
        .required("data");
    if many {
        let meta = ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("total", integer())
            .property("limit", integer())
            .property("offset", integer())
            .build();
        object = object.property("meta", Schema::Object(meta)).required("meta");
    }
    Schema::Object(object.build())
}

fn integer() -> Schema {
    Schema::Object(ObjectBuilder::new().schema_type(Type::Integer).build())
}

fn json_response(description: &str, schema: Schema) -> utoipa::openapi::response::Response {
    ResponseBuilder::new()
        .description(description)
        .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn json_body(name: &str) -> utoipa::openapi::request_body::RequestBody {
    RequestBodyBuilder::new()
        .content(JSON, ContentBuilder::new().schema(Some(schema_ref(name))).build())
        .required(Some(Required::True))
        .build()
}

fn query_param(name: &str, ty: Type, description: &str) -> utoipa::openapi::path::Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(Schema::Object(ObjectBuilder::new().schema_type(ty).build())))
        .build()
}

fn key_param(entry: &TableEntry, delimiter: &str) -> utoipa::openapi::path::Parameter {
    let description = if entry.descriptor.primary_key.len() > 1 {
        format!("{} joined by '{}'", entry.descriptor.primary_key.join(", "), delimiter)
    } else {
        entry.descriptor.primary_key.join("")
    };
    ParameterBuilder::new()
        .name("key")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .description(Some(description))
        .schema(Some(Schema::Object(ObjectBuilder::new().schema_type(Type::String).build())))
        .build()
}

fn operation(entry: &TableEntry, id: &str, summary: String) -> OperationBuilder {
    OperationBuilder::new()
        .tags(Some(vec![entry.descriptor.name.clone()]))
        .operation_id(Some(format!("{}_{}", id, entry.segment)))
        .summary(Some(summary))
}

/// Build the document for every table in the catalog.
pub fn document(catalog: &Catalog, settings: &ApiSettings) -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut components = ComponentsBuilder::new();

    for entry in catalog.entries() {
        let table = &entry.descriptor;
        let ops = Operations::of(table, settings);
        let interfaces = &entry.interfaces;
        for interface in [&interfaces.create, &interfaces.update, &interfaces.read] {
            components = components.schema(interface.name.clone(), interface_schema(interface));
        }
        let read = || schema_ref(&interfaces.read.name);
        let base = format!("{}/{}/", settings.api_prefix, entry.segment);

        let mut collection = PathItemBuilder::new().operation(
            HttpMethod::Get,
            operation(entry, "list", format!("List {}", table.name))
                .parameter(query_param("limit", Type::Integer, "page size"))
                .parameter(query_param("offset", Type::Integer, "rows to skip"))
                .parameter(query_param("order_by", Type::String, "comma-separated columns, '-' for descending"))
                .response("200", json_response("page of rows", envelope(read(), true))),
        );
        if ops.create {
            collection = collection.operation(
                HttpMethod::Post,
                operation(entry, "create", format!("Create a {} row", table.name))
                    .request_body(Some(json_body(&interfaces.create.name)))
                    .response("201", json_response("created row", envelope(read(), false))),
            );
        }
        paths = paths.path(&base, collection.build());

        if ops.read {
            let item_path = format!("{}{{key}}/", base);
            let key = || key_param(entry, &settings.key_delimiter);
            let mut item = PathItemBuilder::new().operation(
                HttpMethod::Get,
                operation(entry, "read", format!("Fetch one {} row", table.name))
                    .parameter(key())
                    .response("200", json_response("row", envelope(read(), false))),
            );
            if ops.update {
                item = item
                    .operation(
                        HttpMethod::Put,
                        operation(entry, "replace", format!("Replace a {} row", table.name))
                            .parameter(key())
                            .request_body(Some(json_body(&interfaces.create.name)))
                            .response("200", json_response("updated row", envelope(read(), false))),
                    )
                    .operation(
                        HttpMethod::Patch,
                        operation(entry, "update", format!("Update a {} row", table.name))
                            .parameter(key())
                            .request_body(Some(json_body(&interfaces.update.name)))
                            .response("200", json_response("updated row", envelope(read(), false))),
                    );
            }
            if ops.delete {
                item = item.operation(
                    HttpMethod::Delete,
                    operation(entry, "delete", format!("Delete a {} row", table.name))
                        .parameter(key())
                        .response("204", ResponseBuilder::new().description("deleted").build()),
                );
            }
            paths = paths.path(item_path, item.build());
        }

        paths = paths.path(
            format!("{}meta/", base),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entry, "meta", format!("Describe {}", table.name))
                        .response("200", ResponseBuilder::new().description("table description").build()),
                )
                .build(),
        );
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(settings.oai_title.clone())
                .version(settings.oai_version.clone())
                .description(Some(format!("REST API generated from schema '{}'", catalog.schema)))
                .build(),
        )
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}
