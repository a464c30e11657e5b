/// Identity shared by every object a device creates

use std::any::Any;
use crate::error::Result;

/// Native API a resource was created by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    Vulkan,
    Metal,
    /// Declared only; no backend implements it
    DirectX,
    /// Declared only; no backend implements it
    OpenGL,
}

impl GraphicsApi {
    pub fn name(self) -> &'static str {
        match self {
            GraphicsApi::Vulkan => "Vulkan",
            GraphicsApi::Metal => "Metal",
            GraphicsApi::DirectX => "DirectX",
            GraphicsApi::OpenGL => "OpenGL",
        }
    }
}

/// Common identity of buffers, images, pipelines, command buffers, ...
///
/// `as_any` lets a backend recover its concrete type from a trait object
/// handed back by the caller (see [`downcast_resource`]).
pub trait RenderingResource: Send + Sync {
    /// Debug name given at creation (never empty)
    fn name(&self) -> &str;

    fn graphics_api(&self) -> GraphicsApi;

    fn as_any(&self) -> &dyn Any;
}

/// Recover the backend type `T` behind `resource`
///
/// Fails with `UnexpectedType` when the resource comes from another backend
/// or is not a `T`.
pub fn downcast_resource<'a, T, R>(resource: &'a R, expected: GraphicsApi) -> Result<&'a T>
where
    T: 'static,
    R: RenderingResource + ?Sized,
{
    if resource.graphics_api() != expected {
        crate::ridge_bail!(
            "ridge::rhi",
            UnexpectedType,
            "Resource '{}' was created by the {} backend, expected {}",
            resource.name(),
            resource.graphics_api().name(),
            expected.name()
        );
    }

    resource.as_any().downcast_ref::<T>().ok_or_else(|| {
        crate::ridge_err!(
            "ridge::rhi",
            UnexpectedType,
            "Resource '{}' is not a {}",
            resource.name(),
            std::any::type_name::<T>()
        )
    })
}

/// Creation-time check shared by every descriptor: names must not be empty
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    crate::ridge_ensure!(
        !name.is_empty(),
        "ridge::rhi",
        InvalidValue,
        "{} name must not be empty",
        kind
    );
    Ok(())
}
